//! Platform inventory: slot classification from platform-status output.
//!
//! Parsed once per router at connection time. Rows of `show platform` are
//! classified as route processors (`r/RPn/CPU0`, `r/RSPn/CPU0`; exactly
//! the rows whose type column carries `(Active)` are active) or line
//! cards (numeric-slot `r/s/CPU0` rows in `IOS XR RUN` state). NPU
//! slices, fabric cards, fans and power modules are ignored.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PlatformError;

static RP_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+/RS?P\d+/CPU\d+)\s+(\S+)\s+IOS XR RUN").expect("rp row pattern")
});

static LC_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+/\d+/CPU\d+)\s+\S+\s+IOS XR RUN").expect("lc row pattern")
});

/// A route processor slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteProcessor {
    pub location: String,
    pub active: bool,
}

/// A line card slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCard {
    pub location: String,
}

/// Slot inventory of one router.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    rps: IndexMap<String, RouteProcessor>,
    lcs: IndexMap<String, LineCard>,
}

impl Inventory {
    /// Parse platform-status output into an inventory.
    ///
    /// At least one route processor must be present; a chassis without
    /// line cards is valid (fixed-form factor systems).
    pub fn parse(output: &[u8]) -> Result<Self, PlatformError> {
        let text = String::from_utf8_lossy(output);
        let mut inventory = Inventory::default();

        for line in text.lines() {
            if let Some(caps) = RP_ROW.captures(line) {
                let location = caps[1].to_string();
                let active = caps[2].contains("(Active)");
                inventory.rps.insert(
                    location.clone(),
                    RouteProcessor { location, active },
                );
            } else if let Some(caps) = LC_ROW.captures(line) {
                let location = caps[1].to_string();
                inventory.lcs.insert(location.clone(), LineCard { location });
            }
        }

        if inventory.rps.is_empty() {
            return Err(PlatformError::NoRouteProcessors);
        }

        Ok(inventory)
    }

    /// Whether a concrete location exists on this chassis.
    pub fn contains(&self, location: &str) -> bool {
        self.rps.contains_key(location) || self.lcs.contains_key(location)
    }

    /// All route processor locations.
    pub fn rps(&self) -> Vec<String> {
        self.rps.keys().cloned().collect()
    }

    /// All line card locations, falling back to the route processors on
    /// a chassis without line cards.
    pub fn lcs(&self) -> Vec<String> {
        if self.lcs.is_empty() {
            return self.rps();
        }
        self.lcs.keys().cloned().collect()
    }

    /// The active route processor, if one is marked.
    pub fn active_rp(&self) -> Option<&str> {
        self.rps
            .values()
            .find(|rp| rp.active)
            .map(|rp| rp.location.as_str())
    }

    /// Every known slot: route processors, then line cards.
    pub fn all_locations(&self) -> Vec<String> {
        self.rps
            .keys()
            .chain(self.lcs.keys())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASR9K: &[u8] = b"Tue Jul 25 09:31:57.141 GMT
Node            Type                      State            Config State
-----------------------------------------------------------------------------
0/RSP0/CPU0     A9K-RSP880-TR(Active)     IOS XR RUN       PWR,NSHUT,MON
0/RSP1/CPU0     A9K-RSP880-TR(Standby)    IOS XR RUN       PWR,NSHUT,MON
0/0/CPU0        A9K-8X100GE-TR            IOS XR RUN       PWR,NSHUT,MON
0/2/CPU0        A9K-8X100GE-TR            IOS XR RUN       PWR,NSHUT,MON
";

    const FIXED_FORM: &[u8] = b"Node              Type                     State                    Config state
--------------------------------------------------------------------------------
0/RP0/CPU0        8201-32FH(Active)        IOS XR RUN               NSHUT
0/PM0             PSU2KW-DCPI              OPERATIONAL              NSHUT
0/FT0             FAN-1RU-PI               OPERATIONAL              NSHUT
";

    const MODULAR: &[u8] = b"Tue Jul 25 09:32:20.342 GMT
Node              Type                       State             Config state
--------------------------------------------------------------------------------
0/0/CPU0          NC55-36X100G-A-SE          IOS XR RUN        NSHUT
0/0/NPU0          Slice                      UP
0/0/NPU1          Slice                      UP
0/1/CPU0          NC57-24DD                  IOS XR RUN        NSHUT
0/1/NPU0          Slice                      UP
0/RP0/CPU0        NC55-RP-E(Active)          IOS XR RUN        NSHUT
0/RP1/CPU0        NC55-RP-E(Standby)         IOS XR RUN        NSHUT
0/FC0             NC55-5508-FC2              OPERATIONAL       NSHUT
0/PM0             NC55-PWR-3KW-DC            OPERATIONAL       NSHUT
0/SC0             NC55-SC                    OPERATIONAL       NSHUT
";

    #[test]
    fn test_parse_dual_rsp_chassis() {
        let inv = Inventory::parse(ASR9K).unwrap();
        assert_eq!(inv.rps(), vec!["0/RSP0/CPU0", "0/RSP1/CPU0"]);
        assert_eq!(inv.lcs(), vec!["0/0/CPU0", "0/2/CPU0"]);
        assert_eq!(inv.active_rp(), Some("0/RSP0/CPU0"));
    }

    #[test]
    fn test_parse_ignores_non_cpu_rows() {
        let inv = Inventory::parse(MODULAR).unwrap();
        assert_eq!(inv.rps(), vec!["0/RP0/CPU0", "0/RP1/CPU0"]);
        assert_eq!(inv.lcs(), vec!["0/0/CPU0", "0/1/CPU0"]);
        assert!(!inv.contains("0/0/NPU0"));
        assert!(!inv.contains("0/FC0"));
    }

    #[test]
    fn test_lcs_fall_back_to_rps() {
        let inv = Inventory::parse(FIXED_FORM).unwrap();
        assert_eq!(inv.rps(), vec!["0/RP0/CPU0"]);
        assert_eq!(inv.lcs(), vec!["0/RP0/CPU0"]);
        assert_eq!(inv.all_locations(), vec!["0/RP0/CPU0"]);
    }

    #[test]
    fn test_no_route_processors_is_an_error() {
        let err = Inventory::parse(b"0/PM0  PSU2KW-DCPI  OPERATIONAL  NSHUT\n").unwrap_err();
        assert!(matches!(err, PlatformError::NoRouteProcessors));
    }

    #[test]
    fn test_contains() {
        let inv = Inventory::parse(ASR9K).unwrap();
        assert!(inv.contains("0/RSP0/CPU0"));
        assert!(inv.contains("0/2/CPU0"));
        assert!(!inv.contains("0/5/CPU0"));
    }
}
