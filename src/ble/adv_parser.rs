//! Advertisement data parsing.
//!
//! Advertising payloads are a sequence of `[len][type][data...]` AD
//! structures.  We only care about the local-name field, which the sensor
//! puts in its scan response (hence active scanning).

/// AD type: Shortened Local Name.
const AD_TYPE_SHORT_NAME: u8 = 0x08;
/// AD type: Complete Local Name.
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

/// Extract the complete/shortened local name from advertisement data.
///
/// Returns the raw name bytes, or `None` if no name field is present or
/// the payload is malformed before one is reached.
pub fn extract_local_name(data: &[u8]) -> Option<&[u8]> {
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            break;
        }
        let ad_type = data[i + 1];
        if ad_type == AD_TYPE_SHORT_NAME || ad_type == AD_TYPE_COMPLETE_NAME {
            return Some(&data[i + 2..i + 1 + len]);
        }
        i += len + 1;
    }
    None
}

/// Exact name comparison.
///
/// Length is checked first so a mismatch never reaches the byte compare.
pub fn name_matches(name: &[u8], target: &[u8]) -> bool {
    if name.len() != target.len() {
        return false;
    }
    name == target
}

/// True when `data` advertises exactly `target` as its local name.
pub fn advertises_name(data: &[u8], target: &[u8]) -> bool {
    extract_local_name(data).is_some_and(|name| name_matches(name, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad_with_name(kind: u8, name: &[u8]) -> heapless::Vec<u8, 64> {
        let mut ad = heapless::Vec::new();
        // Flags first, like a real payload.
        let _ = ad.extend_from_slice(&[0x02, 0x01, 0x06]);
        let _ = ad.push(name.len() as u8 + 1);
        let _ = ad.push(kind);
        let _ = ad.extend_from_slice(name);
        ad
    }

    #[test]
    fn extract_complete_local_name() {
        let ad = ad_with_name(0x09, b"ATC_8E4B89");
        assert_eq!(extract_local_name(&ad), Some(&b"ATC_8E4B89"[..]));
    }

    #[test]
    fn extract_shortened_local_name() {
        let ad = ad_with_name(0x08, b"ATC");
        assert_eq!(extract_local_name(&ad), Some(&b"ATC"[..]));
    }

    #[test]
    fn no_name_in_advertisement() {
        let ad_data = [0x02, 0x01, 0x06];
        assert_eq!(extract_local_name(&ad_data), None);
    }

    #[test]
    fn empty_advertisement_data() {
        let ad_data: [u8; 0] = [];
        assert_eq!(extract_local_name(&ad_data), None);
    }

    #[test]
    fn malformed_ad_length_zero() {
        assert_eq!(extract_local_name(&[0x00, 0x09, b'A']), None);
    }

    #[test]
    fn truncated_name_field_is_ignored() {
        // Claims 11 bytes, only 4 present.
        let ad_data = [0x0B, 0x09, b'A', b'T', b'C'];
        assert_eq!(extract_local_name(&ad_data), None);
    }

    #[test]
    fn exact_target_matches() {
        let ad = ad_with_name(0x09, b"ATC_8E4B89");
        assert!(advertises_name(&ad, b"ATC_8E4B89"));
    }

    #[test]
    fn longer_name_with_target_prefix_does_not_match() {
        let ad = ad_with_name(0x09, b"ATC_8E4B89X");
        assert!(!advertises_name(&ad, b"ATC_8E4B89"));
    }

    #[test]
    fn shorter_name_does_not_match() {
        let ad = ad_with_name(0x09, b"ATC_8E4B8");
        assert!(!advertises_name(&ad, b"ATC_8E4B89"));
    }

    #[test]
    fn same_length_different_bytes_does_not_match() {
        assert!(!name_matches(b"ATC_8E4B8A", b"ATC_8E4B89"));
    }

    #[test]
    fn unnamed_advertisement_never_matches() {
        assert!(!advertises_name(&[0x02, 0x01, 0x06], b"ATC_8E4B89"));
    }
}
