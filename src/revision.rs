//! Revision chain for document numbers
use super::error::{LifecycleError, Result};
use super::number::{DocumentNumber, Series};
use tracing::warn;

/// Computes the next revision of `current`.
///
/// Numbers that do not follow the series grammar fail with
/// [`LifecycleError::MalformedIdentifier`]. With `lenient` set they are
/// revised positionally instead, the way legacy records were handled.
pub fn next_revision(series: Series, current: &str, lenient: bool) -> Result<String> {
    match DocumentNumber::parse(series, current) {
        Ok(number) => Ok(number.revised().to_string()),
        Err(LifecycleError::MalformedIdentifier { reason, .. }) if lenient => {
            let revised = positional_revision(series, current);
            warn!(%series, current, %reason, %revised, "revising malformed number positionally");
            Ok(revised)
        }
        Err(err) => Err(err),
    }
}

/// Segment-position revision used for numbers that predate the grammar.
pub fn positional_revision(series: Series, current: &str) -> String {
    let mut parts: Vec<String> = current.split('/').map(str::to_string).collect();

    match series {
        Series::Quotation => {
            if parts.len() == 6 && parts[5].starts_with('R') {
                parts[5] = format!("R{}", leading_number(&parts[5][1..]).saturating_add(1));
                parts.join("/")
            } else {
                format!("{current}/R1")
            }
        }
        Series::Contract => {
            // a bare three part number can never carry the OS prefix
            let os = parts.len() != 3 && parts[0] == "OS";
            let slot = if os { 4 } else { 3 };

            let bumped = parts
                .get(slot)
                .filter(|token| token.starts_with('R'))
                .map(|token| format!("R{}", leading_number(&token[1..]).saturating_add(1)));
            match bumped {
                Some(token) => parts[slot] = token,
                None => parts.insert(slot.min(parts.len()), "R1".to_string()),
            }
            parts.join("/")
        }
    }
}

fn leading_number(token: &str) -> u32 {
    let end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    token[..end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_revisions_follow_the_grammar() {
        let r1 = next_revision(Series::Quotation, "EPPL/ATT/QTN/2024-25/12", false).unwrap();
        assert_eq!(r1, "EPPL/ATT/QTN/2024-25/12/R1");
        let r2 = next_revision(Series::Quotation, &r1, false).unwrap();
        assert_eq!(r2, "EPPL/ATT/QTN/2024-25/12/R2");

        assert_eq!(
            next_revision(Series::Contract, "OS/PRE/2024-25/7", false).unwrap(),
            "OS/PRE/2024-25/7/R1"
        );
        assert_eq!(
            next_revision(Series::Contract, "OS/PRE/2024-25/7/R9", false).unwrap(),
            "OS/PRE/2024-25/7/R10"
        );
    }

    #[test]
    fn strict_mode_rejects_malformed() {
        let err = next_revision(Series::Quotation, "EPPL/QTN/12", false).unwrap_err();
        assert!(matches!(err, LifecycleError::MalformedIdentifier { .. }));
    }

    #[test]
    fn zero_padded_sequences_keep_their_text() {
        for (series, padded) in [
            (Series::Quotation, "EPPL/ATT/QTN/2024-25/012"),
            (Series::Contract, "PRE/2024-25/007/R1"),
        ] {
            assert!(matches!(
                next_revision(series, padded, false),
                Err(LifecycleError::MalformedIdentifier { .. })
            ));
        }
        assert_eq!(
            next_revision(Series::Quotation, "EPPL/ATT/QTN/2024-25/012", true).unwrap(),
            "EPPL/ATT/QTN/2024-25/012/R1"
        );
        assert_eq!(
            next_revision(Series::Contract, "PRE/2024-25/007/R1", true).unwrap(),
            "PRE/2024-25/007/R2"
        );
    }

    #[test]
    fn lenient_mode_appends_to_unknown_quotation_shapes() {
        assert_eq!(
            next_revision(Series::Quotation, "EPPL/QTN/12", true).unwrap(),
            "EPPL/QTN/12/R1"
        );
    }

    #[test]
    fn positional_quotation_revisions() {
        assert_eq!(
            positional_revision(Series::Quotation, "EPPL/ATT/QTN/2024-25/12"),
            "EPPL/ATT/QTN/2024-25/12/R1"
        );
        assert_eq!(
            positional_revision(Series::Quotation, "EPPL/ATT/QTN/2024-25/12/R4"),
            "EPPL/ATT/QTN/2024-25/12/R5"
        );
        // six parts without an R token is not a revision
        assert_eq!(
            positional_revision(Series::Quotation, "EPPL/ATT/QTN/2024-25/12/X"),
            "EPPL/ATT/QTN/2024-25/12/X/R1"
        );
    }

    #[test]
    fn positional_contract_revisions() {
        assert_eq!(
            positional_revision(Series::Contract, "PRE/2024-25/7"),
            "PRE/2024-25/7/R1"
        );
        assert_eq!(
            positional_revision(Series::Contract, "PRE/2024-25/7/R1"),
            "PRE/2024-25/7/R2"
        );
        assert_eq!(
            positional_revision(Series::Contract, "OS/PRE/2024-25/7"),
            "OS/PRE/2024-25/7/R1"
        );
        // slot 3 holds a non revision token so R1 is inserted before it
        assert_eq!(
            positional_revision(Series::Contract, "PRE/2024-25/7/X"),
            "PRE/2024-25/7/R1/X"
        );
        // short legacy numbers get R1 appended
        assert_eq!(positional_revision(Series::Contract, "PRE/7"), "PRE/7/R1");
    }
}
