//! Companion API versions and the feature thresholds derived from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::codec::ProtocolError;

/// A `major.minor.patch` API version as announced in `BEGIN ApiVersion=...`.
///
/// Ordering is lexicographic over (major, minor, patch), so comparisons like
/// `version >= MINIMUM_API_VERSION` behave as expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    /// Oldest server API this client will talk to.
    pub const MINIMUM: ApiVersion = ApiVersion::new(1, 7, 0);

    /// First API on which the server hands the pincode lock screen to the
    /// client and reports entry progress with `LOCKED-STATE`.
    pub const LOCK_OVERLAY: ApiVersion = ApiVersion::new(1, 8, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn is_supported(&self) -> bool {
        *self >= Self::MINIMUM
    }

    pub fn supports_lock_overlay(&self) -> bool {
        *self >= Self::LOCK_OVERLAY
    }
}

/// What the connected server can do, derived from its `BEGIN` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub companion_version: Option<String>,
    pub api_version: ApiVersion,
    /// The server delegates the pincode lock screen to this client and
    /// reports progress with `LOCKED-STATE`.
    pub supports_lock_overlay: bool,
}

impl Capabilities {
    /// Derives capabilities from an announced API version.
    ///
    /// Returns `None` when the version is below [`ApiVersion::MINIMUM`].
    pub fn negotiate(companion_version: Option<String>, api_version: ApiVersion) -> Option<Self> {
        if !api_version.is_supported() {
            return None;
        }
        Some(Self {
            companion_version,
            api_version,
            supports_lock_overlay: api_version.supports_lock_overlay(),
        })
    }
}

impl FromStr for ApiVersion {
    type Err = ProtocolError;

    /// Accepts `1.7`, `1.7.0` and `1.7.0-beta.2` (the suffix is ignored).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidVersion(s.to_string());

        let core = s.trim().split(['-', '+']).next().unwrap_or_default();
        let mut parts = core.split('.');

        let mut next = |required: bool| -> Result<u32, ProtocolError> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };

        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;

        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() {
        let v: ApiVersion = "1.7.0".parse().unwrap();
        assert_eq!(v, ApiVersion::new(1, 7, 0));
    }

    #[test]
    fn test_parse_two_component_version_defaults_patch() {
        let v: ApiVersion = "1.8".parse().unwrap();
        assert_eq!(v, ApiVersion::new(1, 8, 0));
    }

    #[test]
    fn test_parse_ignores_prerelease_suffix() {
        let v: ApiVersion = "1.9.2-beta.1".parse().unwrap();
        assert_eq!(v, ApiVersion::new(1, 9, 2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "abc".parse::<ApiVersion>(),
            Err(ProtocolError::InvalidVersion(_))
        ));
        assert!("1".parse::<ApiVersion>().is_err());
        assert!("1.2.3.4".parse::<ApiVersion>().is_err());
        assert!("".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_minimum_version_gate() {
        assert!(!ApiVersion::new(1, 6, 0).is_supported());
        assert!(!ApiVersion::new(1, 6, 99).is_supported());
        assert!(ApiVersion::new(1, 7, 0).is_supported());
        assert!(ApiVersion::new(2, 0, 0).is_supported());
    }

    #[test]
    fn test_lock_overlay_threshold() {
        assert!(!ApiVersion::new(1, 7, 5).supports_lock_overlay());
        assert!(ApiVersion::new(1, 8, 0).supports_lock_overlay());
    }

    #[test]
    fn test_negotiate_rejects_old_server() {
        assert_eq!(Capabilities::negotiate(None, ApiVersion::new(1, 6, 0)), None);
    }

    #[test]
    fn test_negotiate_sets_lock_overlay_flag() {
        let caps = Capabilities::negotiate(Some("3.4.0".into()), ApiVersion::new(1, 8, 0)).unwrap();
        assert!(caps.supports_lock_overlay);

        let caps = Capabilities::negotiate(None, ApiVersion::new(1, 7, 0)).unwrap();
        assert!(!caps.supports_lock_overlay);
    }

    #[test]
    fn test_display_is_dotted_triple() {
        assert_eq!(ApiVersion::new(1, 10, 3).to_string(), "1.10.3");
    }
}
