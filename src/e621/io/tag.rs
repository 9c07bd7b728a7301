/// Example written when the tag file does not exist yet.
pub(crate) const TAG_FILE_EXAMPLE: &str = r#"# One search per line. Every tag on a line must match.
# Lines with more than five tags are searched with the first five;
# posts must then carry at least one of the remaining tags.
#
# wolf solo rating:s
# fox canine feral outside day snow night
"#;

/// Example written when the blacklist does not exist yet.
pub(crate) const BLACKLIST_FILE_EXAMPLE: &str = r#"# Posts carrying any of these tags are never downloaded.
# Tags may be separated by spaces or put on their own lines.
"#;

/// Returns every query line of a tag file, trimmed, without blanks or comments.
pub(crate) fn parse_tag_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect()
}

/// Returns every blacklisted tag, one entry per whitespace-separated token.
pub(crate) fn parse_blacklist(contents: &str) -> Vec<String> {
    parse_tag_file(contents)
        .iter()
        .flat_map(|line| line.split_whitespace())
        .map(|tag| tag.to_string())
        .collect()
}
