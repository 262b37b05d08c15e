use serde::Serialize;

pub const DEFAULT_PRE_TAG: &str = "<em>";
pub const DEFAULT_POST_TAG: &str = "</em>";

/// A run of text that is either plain or highlighted
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub highlighted: bool,
}

/// Splits highlighted markup into renderer-neutral runs
///
/// An unterminated pre tag highlights the rest of the string. Empty runs are dropped.
pub fn segments(markup: &str, pre_tag: &str, post_tag: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut rest = markup;

    if pre_tag.is_empty() || post_tag.is_empty() {
        push(&mut out, rest, false);
        return out;
    }

    while let Some(start) = rest.find(pre_tag) {
        push(&mut out, &rest[..start], false);
        rest = &rest[start + pre_tag.len()..];

        match rest.find(post_tag) {
            Some(end) => {
                push(&mut out, &rest[..end], true);
                rest = &rest[end + post_tag.len()..];
            }
            None => {
                push(&mut out, rest, true);
                rest = "";
            }
        }
    }
    push(&mut out, rest, false);

    out
}

/// Strips highlight tags, leaving only the text
pub fn plain_text(markup: &str, pre_tag: &str, post_tag: &str) -> String {
    segments(markup, pre_tag, post_tag)
        .into_iter()
        .map(|s| s.text)
        .collect()
}

fn push(out: &mut Vec<Segment>, text: &str, highlighted: bool) {
    if text.is_empty() {
        return;
    }
    // Merge adjacent runs of the same kind, e.g. `<em>a</em><em>b</em>`
    if let Some(last) = out.last_mut() {
        if last.highlighted == highlighted {
            last.text.push_str(text);
            return;
        }
    }
    out.push(Segment {
        text: text.to_string(),
        highlighted,
    });
}
