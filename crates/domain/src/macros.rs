//! Macro for implementing Display and FromStr for wire-name enums
//!
//! Report phases and log formats are rendered into logs and configuration
//! files by a stable lowercase name. This macro provides both directions from
//! a single table.
//!
//! # Example
//!
//! ```rust
//! use brokerlink_domain::impl_wire_name_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Leg {
//!     Submit,
//!     Poll,
//! }
//!
//! impl_wire_name_conversions!(Leg {
//!     Submit => "submit",
//!     Poll => "poll",
//! });
//!
//! assert_eq!(Leg::Poll.to_string(), "poll");
//! assert_eq!("SUBMIT".parse::<Leg>(), Ok(Leg::Submit));
//! ```

/// Implements Display and FromStr traits for fieldless enums
///
/// - Display writes the mapped name
/// - FromStr parses case-insensitively and reports the enum name on failure
#[macro_export]
macro_rules! impl_wire_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Stage {
        Submitted,
        TemplateReady,
        Done,
    }

    impl_wire_name_conversions!(Stage {
        Submitted => "submitted",
        TemplateReady => "template_ready",
        Done => "done",
    });

    #[test]
    fn display_uses_mapped_name() {
        assert_eq!(Stage::Submitted.to_string(), "submitted");
        assert_eq!(Stage::TemplateReady.to_string(), "template_ready");
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Stage::from_str("TEMPLATE_READY").unwrap(), Stage::TemplateReady);
        assert_eq!(Stage::from_str("Done").unwrap(), Stage::Done);
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let err = Stage::from_str("later").unwrap_err();
        assert!(err.contains("Invalid Stage: later"));
        assert!(Stage::from_str("").is_err());
    }

    #[test]
    fn roundtrip() {
        for stage in [Stage::Submitted, Stage::TemplateReady, Stage::Done] {
            assert_eq!(Stage::from_str(&stage.to_string()).unwrap(), stage);
        }
    }
}
