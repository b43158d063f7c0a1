//! Free teasers for unpaid readers.

use crate::payment::{PaymentPolicy, CURRENCY_UNIT};

/// Header of the appended payment block.
const LOCKED_BANNER: &str = "--- PREMIUM CONTENT LOCKED ---";

/// Renders the leading part of premium text plus payment instructions.
#[derive(Debug, Clone)]
pub struct PreviewRedactor {
    policy: PaymentPolicy,
}

impl PreviewRedactor {
    /// Create a redactor quoting `policy`'s price and payee.
    #[must_use]
    pub fn new(policy: PaymentPolicy) -> Self {
        Self { policy }
    }

    /// Keep the first `floor(lines * visible_fraction)` lines of `content`
    /// and append the payment instructions.
    ///
    /// `visible_fraction` is clamped to `[0, 1]`; NaN counts as 0. The result
    /// is always longer than the visible prefix and is deterministic.
    #[must_use]
    pub fn create_preview(&self, content: &str, visible_fraction: f64) -> String {
        let lines: Vec<&str> = content.lines().collect();
        let visible = visible_line_count(lines.len(), visible_fraction);
        let hidden = lines.len() - visible;

        let mut preview = lines[..visible].join("\n");
        if !preview.is_empty() {
            preview.push_str("\n\n");
        }
        preview.push_str(LOCKED_BANNER);
        preview.push('\n');
        preview.push_str(&format!(
            "{hidden} more line{} available to paying readers.\n",
            if hidden == 1 { " is" } else { "s are" }
        ));
        preview.push_str(&self.payment_instructions());
        preview
    }

    /// The instructions block on its own.
    #[must_use]
    pub fn payment_instructions(&self) -> String {
        format!(
            "To unlock, send {} {CURRENCY_UNIT} to {} and present the transaction signature.",
            self.policy.required_amount, self.policy.recipient_address
        )
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn visible_line_count(line_count: usize, visible_fraction: f64) -> usize {
    let fraction = if visible_fraction.is_nan() {
        0.0
    } else {
        visible_fraction.clamp(0.0, 1.0)
    };
    let visible = (line_count as f64 * fraction).floor() as usize;
    visible.min(line_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::Lamports;
    use proptest::prelude::*;

    const RECIPIENT: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    fn redactor() -> PreviewRedactor {
        PreviewRedactor::new(PaymentPolicy {
            required_amount: Lamports::from_sol_str("0.001").unwrap(),
            recipient_address: RECIPIENT.to_string(),
        })
    }

    #[test]
    fn test_half_of_four_lines() {
        let preview = redactor().create_preview("line1\nline2\nline3\nline4", 0.5);
        assert!(preview.contains("line1"));
        assert!(preview.contains("line2"));
        assert!(!preview.contains("line3"));
        assert!(!preview.contains("line4"));
        assert!(preview.contains("0.001 SOL"));
        assert!(preview.contains(RECIPIENT));
        assert!(preview.contains("2 more lines are available"));
    }

    #[test]
    fn test_fraction_bounds() {
        let text = "a\nb\nc";
        let none = redactor().create_preview(text, 0.0);
        assert!(none.starts_with(LOCKED_BANNER));

        let all = redactor().create_preview(text, 1.0);
        assert!(all.starts_with("a\nb\nc\n\n"));
        assert!(all.contains("0 more lines"));

        assert_eq!(redactor().create_preview(text, 7.5), all);
        assert_eq!(redactor().create_preview(text, -1.0), none);
        assert_eq!(redactor().create_preview(text, f64::NAN), none);
    }

    #[test]
    fn test_floor_rounding() {
        // 3 * 0.66 = 1.98 -> 1 line
        let preview = redactor().create_preview("a\nb\nc", 0.66);
        assert!(preview.starts_with("a\n\n"));
        assert!(preview.contains("2 more lines"));
        assert!(redactor().create_preview("a\nb", 0.5).contains("1 more line is"));
    }

    #[test]
    fn test_empty_content_still_has_instructions() {
        let preview = redactor().create_preview("", 0.5);
        assert!(preview.contains(&redactor().payment_instructions()));
    }

    fn multiline_text() -> impl Strategy<Value = String> {
        proptest::collection::vec("[^\r\n]{0,40}", 0..20).prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        #[test]
        fn prop_preview_longer_than_prefix(content in multiline_text(), fraction in 0.0f64..=1.0) {
            let lines: Vec<&str> = content.lines().collect();
            let visible = visible_line_count(lines.len(), fraction);
            let prefix = lines[..visible].join("\n");

            let first = redactor().create_preview(&content, fraction);
            prop_assert!(first.len() > prefix.len());
            prop_assert!(first.starts_with(&prefix));
            prop_assert_eq!(first, redactor().create_preview(&content, fraction));
        }

        #[test]
        fn prop_hidden_line_count_reported(content in multiline_text(), fraction in 0.0f64..=1.0) {
            let line_count = content.lines().count();
            let hidden = line_count - visible_line_count(line_count, fraction);
            let preview = redactor().create_preview(&content, fraction);
            let expected = format!("{hidden} more line");
            prop_assert!(preview.contains(&expected));
        }
    }
}
