//! Post-processing of raw scan results: signal-strength ordering, duplicate
//! suppression, and the minimum-quality filter. Entries are marked rather
//! than deleted so the cached set stays stable across renders.

use crate::traits::{RawNetwork, ScanOutcome};
use tracing::debug;

/// Convert an RSSI reading (dBm) into a 0-100 quality score.
/// Anything at or below -100 dBm is 0, anything at or above -50 dBm is 100,
/// linear in between.
pub fn rssi_to_quality(rssi: i32) -> u8 {
    if rssi <= -100 {
        0
    } else if rssi >= -50 {
        100
    } else {
        (2 * (rssi + 100)) as u8
    }
}

/// One processed scan entry. `duplicate` and `below_threshold` are kept as
/// independent flags; [`ScanEntry::visible`] combines them for rendering.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub network: RawNetwork,
    pub duplicate: bool,
    pub below_threshold: bool,
}

impl ScanEntry {
    pub fn quality(&self) -> u8 {
        rssi_to_quality(self.network.rssi)
    }

    pub fn visible(&self) -> bool {
        !self.duplicate && !self.below_threshold
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanFilter {
    pub remove_duplicates: bool,
    /// `None` disables the filter. An entry whose quality is at or below the
    /// minimum is suppressed.
    pub minimum_quality: Option<u8>,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            minimum_quality: None,
        }
    }
}

/// Sort, deduplicate and filter one scan pass. The returned set replaces any
/// previously cached one wholesale.
pub fn process_results(raw: Vec<RawNetwork>, filter: &ScanFilter) -> Vec<ScanEntry> {
    let mut entries: Vec<ScanEntry> = raw
        .into_iter()
        .map(|network| ScanEntry {
            network,
            duplicate: false,
            below_threshold: false,
        })
        .collect();

    entries.sort_unstable_by(|a, b| b.network.rssi.cmp(&a.network.rssi));

    // Duplicate marking requires the RSSI sort above so the strongest
    // instance of a repeated SSID is the one that survives.
    if filter.remove_duplicates {
        for i in 0..entries.len() {
            if entries[i].duplicate {
                continue;
            }
            let ssid = entries[i].network.ssid.clone();
            for later in entries.iter_mut().skip(i + 1) {
                if later.network.ssid == ssid && !later.duplicate {
                    debug!(ssid = %later.network.ssid, "duplicate access point suppressed");
                    later.duplicate = true;
                }
            }
        }
    }

    if let Some(minimum) = filter.minimum_quality {
        for entry in entries.iter_mut() {
            if entry.duplicate {
                continue;
            }
            if entry.quality() <= minimum {
                debug!(ssid = %entry.network.ssid, quality = entry.quality(), "skipping low quality");
                entry.below_threshold = true;
            }
        }
    }

    debug!(count = entries.len(), "scan processed");
    for entry in entries.iter().filter(|e| e.visible()) {
        debug!(
            ssid = %entry.network.ssid,
            rssi = entry.network.rssi,
            quality = entry.quality(),
            "network"
        );
    }

    entries
}

/// Fold a scan outcome into a processed entry set. Transient radio
/// conditions yield an empty set, never an error.
pub fn entries_from_outcome(outcome: ScanOutcome, filter: &ScanFilter) -> Vec<ScanEntry> {
    match outcome {
        ScanOutcome::Done(raw) => process_results(raw, filter),
        ScanOutcome::Running => {
            debug!("scan still running, treating as zero results");
            Vec::new()
        }
        ScanOutcome::Failed => {
            debug!("scan failed, treating as zero results");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Encryption;

    fn network(ssid: &str, rssi: i32) -> RawNetwork {
        RawNetwork {
            ssid: ssid.to_string(),
            bssid: [0; 6],
            rssi,
            channel: 1,
            encryption: Encryption::Encrypted,
            hidden: false,
        }
    }

    #[test]
    fn quality_curve_endpoints() {
        assert_eq!(rssi_to_quality(-100), 0);
        assert_eq!(rssi_to_quality(-120), 0);
        assert_eq!(rssi_to_quality(-50), 100);
        assert_eq!(rssi_to_quality(-30), 100);
        assert_eq!(rssi_to_quality(-75), 50);
    }

    #[test]
    fn quality_is_monotonic() {
        let mut previous = rssi_to_quality(-130);
        for rssi in -129..=0 {
            let quality = rssi_to_quality(rssi);
            assert!(quality >= previous, "quality dipped at {rssi}");
            previous = quality;
        }
    }

    #[test]
    fn sorted_by_descending_rssi() {
        let entries = process_results(
            vec![network("a", -80), network("b", -40), network("c", -60)],
            &ScanFilter::default(),
        );
        let rssi: Vec<i32> = entries.iter().map(|e| e.network.rssi).collect();
        assert_eq!(rssi, vec![-40, -60, -80]);
    }

    #[test]
    fn strongest_duplicate_survives() {
        let entries = process_results(
            vec![network("Home", -60), network("Home", -40)],
            &ScanFilter::default(),
        );
        let survivors: Vec<&ScanEntry> = entries.iter().filter(|e| !e.duplicate).collect();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].network.rssi, -40);
        assert!(entries.iter().any(|e| e.duplicate));
    }

    #[test]
    fn dedup_can_be_disabled() {
        let filter = ScanFilter {
            remove_duplicates: false,
            minimum_quality: None,
        };
        let entries = process_results(vec![network("Home", -60), network("Home", -40)], &filter);
        assert!(entries.iter().all(|e| !e.duplicate));
    }

    #[test]
    fn low_quality_marked_not_deleted() {
        let filter = ScanFilter {
            remove_duplicates: true,
            minimum_quality: Some(30),
        };
        // -90 dBm is quality 20, below the floor; -55 dBm is quality 90.
        let entries = process_results(vec![network("weak", -90), network("ok", -55)], &filter);
        assert_eq!(entries.len(), 2);
        let weak = entries.iter().find(|e| e.network.ssid == "weak").unwrap();
        assert!(weak.below_threshold);
        assert!(!weak.visible());
        let ok = entries.iter().find(|e| e.network.ssid == "ok").unwrap();
        assert!(ok.visible());
    }

    #[test]
    fn failed_scan_yields_empty_set() {
        let filter = ScanFilter::default();
        assert!(entries_from_outcome(ScanOutcome::Failed, &filter).is_empty());
        assert!(entries_from_outcome(ScanOutcome::Running, &filter).is_empty());
    }
}
