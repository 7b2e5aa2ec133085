//! Query string filters for intercepted requests

use crate::snapshot::RecordTypeMask;

const APPLICATION_KEY: &str = "application";
const INTERFACE_KEY: &str = "inf.name";
const RECORD_TYPES_KEY: &str = "record.types";

/// Per-request output filter taken from the query string
///
/// `application=a;b` accumulates metric-name substrings, `inf.name=` names
/// the interface for the system section and `record.types=` overrides the
/// record-type mask. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    applications: Vec<String>,
    interface: Option<String>,
    record_types: Option<RecordTypeMask>,
}

impl QueryFilter {
    /// Parse a raw query string (without the leading `?`)
    pub fn parse(query: &str) -> Self {
        let mut filter = Self::default();

        for arg in query.split('&').filter(|a| !a.is_empty()) {
            let Some((key, value)) = arg.split_once('=') else {
                continue;
            };
            match key {
                APPLICATION_KEY => filter.applications.extend(
                    value
                        .split(';')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                ),
                INTERFACE_KEY => {
                    filter.interface = (!value.is_empty()).then(|| value.to_string());
                }
                RECORD_TYPES_KEY => {
                    filter.record_types = Some(RecordTypeMask::from_bits(parse_hex_lenient(value)));
                }
                _ => {}
            }
        }

        filter
    }

    /// Check a metric name against the substring allow-list
    ///
    /// An empty list includes everything.
    #[inline]
    pub fn includes(&self, name: &str) -> bool {
        self.applications.is_empty() || self.applications.iter().any(|s| name.contains(s.as_str()))
    }

    pub fn applications(&self) -> &[String] {
        &self.applications
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    pub fn record_types(&self) -> Option<RecordTypeMask> {
        self.record_types
    }
}

/// Read leading hex digits, never failing
///
/// An optional `0x` prefix is skipped, parsing stops at the first non-hex
/// character, no digits yields 0 and overflow saturates.
fn parse_hex_lenient(value: &str) -> u32 {
    let value = value.trim_start();
    let value = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    value
        .chars()
        .map_while(|c| c.to_digit(16))
        .try_fold(0u32, |acc, d| acc.checked_mul(16)?.checked_add(d))
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_filter() {
        let filter = QueryFilter::parse("application=foo;bar&inf.name=eth0");
        assert_eq!(filter.applications(), ["foo", "bar"]);
        assert!(filter.includes("foo_requests"));
        assert!(filter.includes("bar_count"));
        assert!(!filter.includes("baz_count"));
        assert_eq!(filter.interface(), Some("eth0"));
        assert_eq!(filter.record_types(), None);
    }

    #[test]
    fn test_empty_filter_includes_all() {
        let filter = QueryFilter::parse("");
        assert!(filter.includes("anything"));
        assert_eq!(filter.interface(), None);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let filter = QueryFilter::parse("application=Foo");
        assert!(!filter.includes("foo_requests"));
        assert!(filter.includes("xFoo"));
    }

    #[test]
    fn test_applications_accumulate_and_scalars_take_last() {
        let filter =
            QueryFilter::parse("application=a&inf.name=eth0&application=b;c&inf.name=bond0");
        assert_eq!(filter.applications(), ["a", "b", "c"]);
        assert_eq!(filter.interface(), Some("bond0"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let filter = QueryFilter::parse("foo=bar&noequals&&application=x");
        assert_eq!(filter.applications(), ["x"]);
    }

    #[test]
    fn test_record_types_tolerant() {
        let cases = [
            ("record.types=122", 0x122),
            ("record.types=0x3f", 0x3f),
            ("record.types=1fzz", 0x1f),
            ("record.types=zz", 0),
            ("record.types=", 0),
            ("record.types=fffffffff", u32::MAX),
        ];
        for (query, bits) in cases {
            assert_eq!(
                QueryFilter::parse(query).record_types(),
                Some(RecordTypeMask::from_bits(bits)),
                "{query}"
            );
        }
    }
}
