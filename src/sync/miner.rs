use itertools::Itertools;

const MAX_TAG_LEN: usize = 41;

/// Pool tag from a coinbase script, e.g. `/ViaBTC/` in the scriptSig text.
/// Returns the first slash-delimited tag that looks like a name.
pub fn extract_miner(coinbase_hex: &str) -> Option<String> {
    let bytes = hex::decode(coinbase_hex).ok()?;

    let text: String = bytes
        .iter()
        .map(|&b| {
            if (0x20..=0x7e).contains(&b) {
                b as char
            } else {
                ' '
            }
        })
        .collect();

    let cleaned = text.split_whitespace().join(" ");
    let parts = cleaned.split('/').collect_vec();

    if parts.len() < 3 {
        return None;
    }

    parts[1..parts.len() - 1]
        .iter()
        .map(|part| part.trim())
        .find(|tag| is_tag(tag))
        .map(str::to_string)
}

fn is_tag(tag: &str) -> bool {
    let mut chars = tag.chars();

    let starts_alphanumeric = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());

    starts_alphanumeric
        && tag.len() <= MAX_TAG_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coinbase(script: &[u8]) -> String {
        hex::encode(script)
    }

    #[test]
    fn finds_pool_tag_between_height_push_and_extranonce() {
        let mut script = vec![0x03, 0xa0, 0xbb, 0x0d];
        script.extend_from_slice(b"/ViaBTC/Mined by someone/");
        script.extend_from_slice(&[0x00, 0xfe, 0x12]);

        assert_eq!(extract_miner(&coinbase(&script)), Some("ViaBTC".into()));
    }

    #[test]
    fn trims_spaces_inside_slashes() {
        let script = b"\x04\x01\x02/  Mining-Dutch  /";

        assert_eq!(
            extract_miner(&coinbase(script)),
            Some("Mining-Dutch".into())
        );
    }

    #[test]
    fn skips_segments_that_are_not_names() {
        let script = b"/$$$/BTC.com/";

        assert_eq!(extract_miner(&coinbase(script)), Some("BTC.com".into()));
    }

    #[test]
    fn nothing_without_a_closed_tag() {
        assert_eq!(extract_miner(&coinbase(b"\x03\x01\x02\x03/open")), None);
        assert_eq!(extract_miner("abc"), None);
        assert_eq!(extract_miner("zz"), None);
    }

    #[test]
    fn rejects_overlong_tags() {
        let long = format!("/{}/", "a".repeat(42));

        assert_eq!(extract_miner(&coinbase(long.as_bytes())), None);
    }
}
