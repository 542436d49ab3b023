/// National significant number used when a guest has no usable phone. Card
/// providers insist on a well-formed number even though nothing is charged
/// to it.
const PLACEHOLDER_NATIONAL: &str = "780000000";
const NATIONAL_LENGTH: usize = 9;

/// A phone number in the two shapes payment providers ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPhone {
    /// Ten digits with the trunk prefix, e.g. `0788123456`.
    pub local: String,
    /// Country code and national number, no `+`, e.g. `250788123456`.
    pub international: String,
}

impl NormalizedPhone {
    fn from_national(national: &str, country_code: &str) -> Self {
        Self {
            local: format!("0{national}"),
            international: format!("{country_code}{national}"),
        }
    }

    pub fn placeholder(country_code: &str) -> Self {
        Self::from_national(PLACEHOLDER_NATIONAL, country_code)
    }
}

/// Accepts `+250 788 123 456`, `250788123456`, `0788123456` or `788123456`.
pub fn normalize_phone(raw: &str, country_code: &str) -> Option<NormalizedPhone> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    let national = if digits.len() == country_code.len() + NATIONAL_LENGTH
        && digits.starts_with(country_code)
    {
        &digits[country_code.len()..]
    } else if digits.len() == NATIONAL_LENGTH + 1 && digits.starts_with('0') {
        &digits[1..]
    } else if digits.len() == NATIONAL_LENGTH {
        digits.as_str()
    } else {
        return None;
    };

    if national.starts_with('0') {
        return None;
    }
    Some(NormalizedPhone::from_national(national, country_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepted_shapes() {
        let expected = NormalizedPhone {
            local: "0788123456".to_string(),
            international: "250788123456".to_string(),
        };
        for raw in ["+250 788 123 456", "250788123456", "0788123456", "788-123-456"] {
            assert_eq!(normalize_phone(raw, "250"), Some(expected.clone()), "{raw}");
        }
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize_phone("12345", "250"), None);
        assert_eq!(normalize_phone("", "250"), None);
        assert_eq!(normalize_phone("00788123456", "250"), None);
    }

    #[test]
    fn test_placeholder_is_well_formed() {
        let p = NormalizedPhone::placeholder("250");
        assert_eq!(p.local.len(), 10);
        assert_eq!(normalize_phone(&p.international, "250"), Some(p));
    }
}
