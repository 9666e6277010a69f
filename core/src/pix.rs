//! PIX static BRCode codec.
//!
//! A BRCode is a flat sequence of tag-length-value fields: a two-digit id, a
//! two-digit zero-padded decimal length and the value. The last field is
//! `63` (CRC) whose value is the CRC-16/CCITT-FALSE of everything before it,
//! including the `6304` header, as four uppercase hex digits.
//!
//! Field order produced by [`encode`]:
//!
//! | Id | Content |
//! |----|---------|
//! | `00` | payload format indicator, `01` |
//! | `26` | merchant account: `00` GUI `br.gov.bcb.pix`, `01` PIX key |
//! | `52` | merchant category code, `0000` |
//! | `53` | currency, `986` (BRL) |
//! | `54` | amount, optional, `10.00`, positive, at most 13 |
//! | `58` | country, `BR` |
//! | `59` | merchant name, at most 25 |
//! | `60` | merchant city, at most 15 |
//! | `62` | additional data: `05` reference label `***` |
//! | `63` | CRC |

use crate::types::Money;
use std::fmt::Write as _;
use thiserror::Error;

const GUI: &str = "br.gov.bcb.pix";
const MAX_NAME: usize = 25;
const MAX_CITY: usize = 15;
const MAX_KEY: usize = 77;
const MAX_AMOUNT: usize = 13;
const CRC_HEADER: &str = "6304";

/// Errors from encoding or decoding a BRCode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PixError {
    /// PIX key is empty
    #[error("PIX key is empty")]
    EmptyKey,

    /// PIX key does not fit in the merchant account field
    #[error("PIX key is {0} bytes, at most 77 allowed")]
    KeyTooLong(usize),

    /// Amount is zero or does not fit in 13 characters
    #[error("Amount {0} must be positive and at most 13 characters")]
    InvalidAmount(String),

    /// Merchant name or city is empty after normalisation
    #[error("{0} is empty")]
    EmptyField(&'static str),

    /// Payload is not a well-formed TLV sequence
    #[error("Malformed BRCode at offset {offset}: {reason}")]
    Malformed {
        /// Byte offset of the bad field
        offset: usize,
        /// What is wrong
        reason: &'static str,
    },

    /// The trailing CRC does not match the payload
    #[error("CRC mismatch: payload says {declared}, computed {computed}")]
    CrcMismatch {
        /// CRC carried by the payload
        declared: String,
        /// CRC of the payload
        computed: String,
    },
}

/// One decoded TLV field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Two-digit id
    pub id: String,
    /// Raw value
    pub value: String,
}

/// CRC-16/CCITT-FALSE: polynomial `0x1021`, initial value `0xFFFF`, MSB
/// first, no reflection, no final XOR.
///
/// ```
/// assert_eq!(rifa_core::pix::crc16_ccitt_false(b"123456789"), 0x29B1);
/// ```
#[must_use]
pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Builds a static BRCode.
///
/// Name and city have Portuguese diacritics folded to ASCII, other non-ASCII
/// characters dropped, and are then truncated to their limits, so every
/// declared length is a byte length.
///
/// Leave `amount` out to let the payer type it in; a zero amount is
/// rejected.
///
/// # Errors
///
/// Returns [`PixError`] for an empty or oversized key, an empty name or
/// city, or an amount that is zero or longer than 13 characters.
pub fn encode(
    pix_key: &str,
    merchant_name: &str,
    merchant_city: &str,
    amount: Option<Money>,
) -> Result<String, PixError> {
    let key = pix_key.trim();
    if key.is_empty() {
        return Err(PixError::EmptyKey);
    }
    if key.len() > MAX_KEY {
        return Err(PixError::KeyTooLong(key.len()));
    }
    let name = normalise(merchant_name, MAX_NAME);
    if name.is_empty() {
        return Err(PixError::EmptyField("merchant name"));
    }
    let city = normalise(merchant_city, MAX_CITY);
    if city.is_empty() {
        return Err(PixError::EmptyField("merchant city"));
    }
    let amount = amount.map(|a| a.to_decimal_string());
    if let Some(bad) = amount.as_ref().filter(|v| v.len() > MAX_AMOUNT || *v == "0.00") {
        return Err(PixError::InvalidAmount(bad.clone()));
    }

    let mut account = String::new();
    push_field(&mut account, "00", GUI);
    push_field(&mut account, "01", key);

    let mut additional = String::new();
    push_field(&mut additional, "05", "***");

    let mut payload = String::with_capacity(160);
    push_field(&mut payload, "00", "01");
    push_field(&mut payload, "26", &account);
    push_field(&mut payload, "52", "0000");
    push_field(&mut payload, "53", "986");
    if let Some(amount) = &amount {
        push_field(&mut payload, "54", amount);
    }
    push_field(&mut payload, "58", "BR");
    push_field(&mut payload, "59", &name);
    push_field(&mut payload, "60", &city);
    push_field(&mut payload, "62", &additional);
    payload.push_str(CRC_HEADER);

    let crc = crc16_ccitt_false(payload.as_bytes());
    let _ = write!(payload, "{crc:04X}");
    Ok(payload)
}

/// Splits a payload into its top-level fields.
///
/// # Errors
///
/// Returns [`PixError::Malformed`] if a header is truncated, a length is not
/// two decimal digits, or a value runs past the end.
pub fn parse(payload: &str) -> Result<Vec<Field>, PixError> {
    if !payload.is_ascii() {
        return Err(PixError::Malformed {
            offset: 0,
            reason: "non-ASCII payload",
        });
    }

    let mut fields = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let header = payload.get(offset..offset + 4).ok_or(PixError::Malformed {
            offset,
            reason: "truncated header",
        })?;
        let (id, len) = header.split_at(2);
        if !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PixError::Malformed {
                offset,
                reason: "non-numeric id",
            });
        }
        let len: usize = len
            .parse()
            .ok()
            .filter(|_| len.bytes().all(|b| b.is_ascii_digit()))
            .ok_or(PixError::Malformed {
                offset,
                reason: "non-numeric length",
            })?;
        let start = offset + 4;
        let value = payload.get(start..start + len).ok_or(PixError::Malformed {
            offset,
            reason: "value runs past end",
        })?;
        fields.push(Field {
            id: id.to_string(),
            value: value.to_string(),
        });
        offset = start + len;
    }
    Ok(fields)
}

/// Checks structure and CRC of a payload, returning its fields.
///
/// # Errors
///
/// Returns [`PixError::Malformed`] if the payload does not end in a four
/// character `63` field, or [`PixError::CrcMismatch`].
pub fn verify(payload: &str) -> Result<Vec<Field>, PixError> {
    let fields = parse(payload)?;
    let crc_ok = fields
        .last()
        .is_some_and(|f| f.id == "63" && f.value.len() == 4);
    if !crc_ok {
        return Err(PixError::Malformed {
            offset: payload.len(),
            reason: "missing trailing CRC field",
        });
    }

    let (body, declared) = payload.split_at(payload.len() - 4);
    let computed = format!("{:04X}", crc16_ccitt_false(body.as_bytes()));
    if !declared.eq_ignore_ascii_case(&computed) {
        return Err(PixError::CrcMismatch {
            declared: declared.to_string(),
            computed,
        });
    }
    Ok(fields)
}

fn push_field(out: &mut String, id: &str, value: &str) {
    let _ = write!(out, "{id}{:02}{value}", value.len());
}

fn normalise(input: &str, max: usize) -> String {
    let folded: String = input.trim().chars().filter_map(fold).collect();
    let mut out = folded.trim().to_string();
    out.truncate(max);
    out.trim_end().to_string()
}

fn fold(c: char) -> Option<char> {
    let folded = match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        c if c.is_ascii() && !c.is_ascii_control() => c,
        _ => return None,
    };
    Some(folded)
}
