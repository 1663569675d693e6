/// OUI assigned to the manufacturer of the LYWSD03MMC radio.
pub const MANUFACTURER_OUI: [&str; 3] = ["A4", "C1", "38"];

fn is_hex_pair(group: &str) -> bool {
    group.len() == 2 && group.chars().all(|c| c.is_ascii_hexdigit())
}

/// Check whether `address` belongs to the sensor's manufacturer.
///
/// Accepts the bare prefix (`A4:C1:38`, `a4c138`) or a full six byte
/// address, with or without colons, in any case.
pub fn is_valid_device_address(address: &str) -> bool {
    let address = address.trim().to_ascii_uppercase();
    if !address.is_ascii() {
        return false;
    }

    let groups: Vec<&str> = if address.contains(':') {
        address.split(':').collect()
    } else if address.len() % 2 == 0 {
        (0..address.len())
            .step_by(2)
            .map(|i| &address[i..i + 2])
            .collect()
    } else {
        return false;
    };

    (groups.len() == 3 || groups.len() == 6)
        && groups.iter().all(|g| is_hex_pair(g))
        && groups[..3] == MANUFACTURER_OUI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_addresses() {
        assert!(is_valid_device_address("A4:C1:38:01:02:03"));
        assert!(is_valid_device_address("a4:c1:38:ab:cd:ef"));
        assert!(is_valid_device_address("A4C138ABCDEF"));
        assert!(!is_valid_device_address("00:11:22:33:44:55"));
        assert!(!is_valid_device_address("A4:C1:39:01:02:03"));
    }

    #[test]
    fn test_prefix_forms() {
        assert!(is_valid_device_address("a4c138"));
        assert!(is_valid_device_address("A4:C1:38"));
        assert!(is_valid_device_address(" a4:C1:38 "));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(!is_valid_device_address(""));
        assert!(!is_valid_device_address("A4:C1"));
        assert!(!is_valid_device_address("A4:C1:38:01:02"));
        assert!(!is_valid_device_address("A4:C1:38:01:02:0G"));
        assert!(!is_valid_device_address("A4:C1:38:01:02:03:04"));
        assert!(!is_valid_device_address("A4C1380"));
        assert!(!is_valid_device_address("A4-C1-38-01-02-03"));
        assert!(!is_valid_device_address("Ä4:C1:38"));
    }
}
