//! Markup neutralization for user-supplied text.
//!
//! Every text write path (group message, DM, edit) escapes exactly five
//! HTML-special characters before persisting, so stored text is never
//! directly renderable as markup. Display sides decode the same fixed
//! entity set and must render through a text-only sink. The encode/decode
//! pair is exact and symmetric for these five characters and touches
//! nothing else.

/// Escape `&`, `<`, `>`, `"` and `'` to their entities. `&` goes first so
/// already-produced entities are not double-escaped.
pub fn sanitize(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

/// Inverse of [`sanitize`]. `&amp;` is decoded last, mirroring the encode
/// order, so a literal ampersand survives the round trip.
pub fn decode(input: &str) -> String {
    input
        .replace("&#039;", "'")
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_tags_are_neutralized() {
        let out = sanitize("<script>alert('x')</script>");
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
        assert!(!out.contains('\''));
        assert_eq!(out, "&lt;script&gt;alert(&#039;x&#039;)&lt;/script&gt;");
    }

    #[test]
    fn round_trip_is_exact() {
        let inputs = [
            "plain text",
            "<script>alert(\"hi\")</script>",
            "a & b & c",
            "it's \"quoted\"",
            "&lt;already escaped?&gt;",
            "",
        ];
        for input in inputs {
            assert_eq!(decode(&sanitize(input)), input, "input: {input:?}");
        }
    }

    #[test]
    fn ampersand_escapes_first() {
        // If '&' were escaped after '<', "&lt;" would become "&amp;lt;".
        assert_eq!(sanitize("<"), "&lt;");
        assert_eq!(sanitize("&lt;"), "&amp;lt;");
        assert_eq!(decode("&amp;lt;"), "&lt;");
    }

    #[test]
    fn untouched_characters_pass_through() {
        assert_eq!(sanitize("héllo 👍 ~!@#$%"), "héllo 👍 ~!@#$%");
    }
}
