use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Shortest and longest base-58 rendering of a 32-byte public key.
pub const MIN_ADDRESS_LEN: usize = 32;
pub const MAX_ADDRESS_LEN: usize = 44;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressValidation {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl AddressValidation {
    fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
        }
    }
}

/// Checks that `address` is a wallet address: non-empty, 32-44 chars, decodes
/// to 32 bytes and lies on the ed25519 curve. Program-derived addresses fail
/// the curve check.
pub fn validate(address: &str) -> AddressValidation {
    if address.trim().is_empty() {
        return AddressValidation::invalid("address must be a non-empty string");
    }

    if address.len() < MIN_ADDRESS_LEN || address.len() > MAX_ADDRESS_LEN {
        return AddressValidation::invalid(format!(
            "address length must be between {} and {} characters, got {}",
            MIN_ADDRESS_LEN,
            MAX_ADDRESS_LEN,
            address.len()
        ));
    }

    let pubkey = match Pubkey::from_str(address) {
        Ok(pubkey) => pubkey,
        Err(e) => return AddressValidation::invalid(format!("invalid address: {}", e)),
    };

    if !pubkey.is_on_curve() {
        return AddressValidation::invalid("address is not a valid ed25519 public key");
    }

    AddressValidation::valid()
}

/// Parses an address that may be off-curve (mints, lookup tables, programs).
pub fn parse_address(address: &str) -> Result<Pubkey, String> {
    Pubkey::from_str(address.trim()).map_err(|e| format!("invalid address {}: {}", address, e))
}

/// Short `xxxxxxxx...yyyyyyyy` rendering for log lines.
pub fn short(address: &str) -> String {
    if address.len() <= 16 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..8], &address[address.len() - 8..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::{Keypair, Signer};

    #[test]
    fn rejects_empty_and_short_inputs() {
        for input in ["", "   ", "short"] {
            let result = validate(input);
            assert!(!result.is_valid, "{input:?} should be rejected");
            assert!(result.error.as_deref().is_some_and(|e| !e.is_empty()));
        }
    }

    #[test]
    fn rejects_overlong_input() {
        let result = validate(&"1".repeat(45));
        assert!(!result.is_valid);
        assert!(result.error.unwrap().contains("between 32 and 44"));
    }

    #[test]
    fn rejects_non_base58_characters() {
        // '0', 'O', 'I' and 'l' are outside the base-58 alphabet.
        let result = validate("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl");
        assert!(!result.is_valid);
        assert!(result.error.unwrap().starts_with("invalid address"));
    }

    #[test]
    fn rejects_off_curve_key() {
        let (pda, _) = Pubkey::find_program_address(&[b"vault"], &Pubkey::new_unique());
        let encoded = pda.to_string();
        assert!(encoded.len() >= MIN_ADDRESS_LEN);

        let result = validate(&encoded);
        assert!(!result.is_valid);
        assert_eq!(
            result.error.as_deref(),
            Some("address is not a valid ed25519 public key")
        );
    }

    #[test]
    fn accepts_wallet_key() {
        let wallet = Keypair::new().pubkey().to_string();
        assert_eq!(validate(&wallet), AddressValidation::valid());
    }

    #[test]
    fn parse_address_accepts_program_ids() {
        let mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        assert_eq!(parse_address(mint).unwrap().to_string(), mint);
        assert!(parse_address("nope").is_err());
    }

    #[test]
    fn short_keeps_both_ends() {
        assert_eq!(
            short("93rJ8i5GfqYADUuhTimK3FruQ9Fq43auPZQkAts2WdfT"),
            "93rJ8i5G...Ats2WdfT"
        );
        assert_eq!(short("abc"), "abc");
    }
}
