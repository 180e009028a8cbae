use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

// OSC (`ESC ]` up to BEL or ST) first, then 7-bit C1 `ESC Fe` forms, with CSI
// (`ESC [`) taking parameter/intermediate/final bytes
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)|\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])")
        .expect("constant regex pattern is valid")
});

/// Strips terminal escape sequences from Terraform output.
///
/// Removal is repeated until nothing matches, since deleting one sequence can
/// splice together another (`ESC ESC[0m [0m`). This makes `clean` idempotent.
pub fn clean(text: &str) -> Cow<'_, str> {
    if !ANSI_ESCAPE.is_match(text) {
        return Cow::Borrowed(text);
    }
    let mut current = ANSI_ESCAPE.replace_all(text, "").into_owned();
    while ANSI_ESCAPE.is_match(&current) {
        current = ANSI_ESCAPE.replace_all(&current, "").into_owned();
    }
    Cow::Owned(current)
}
