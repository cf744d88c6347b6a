//! OSTC3 firmware hex-record codec: a vendor hex-record text format
//! decrypted with an AES-128-ECB ciphertext-feedback construction and
//! verified against a trailing Fletcher-variant checksum. The raw AES
//! block primitive is assumed available; this module consumes the `aes`
//! crate's block cipher rather than hand-rolling one.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::bytes;
use crate::checksum;
use crate::error::{Error, Result};

const BLOCK_LEN: usize = 16;

/// Fixed vendor key used to key every OSTC3 firmware image, regardless of
/// device instance.
const VENDOR_KEY: [u8; BLOCK_LEN] = [
    0xB4, 0x22, 0x3F, 0xB0, 0xA7, 0x82, 0x43, 0x45, 0x90, 0x4B, 0xD6, 0x7E, 0x55, 0x41, 0x98, 0xD4,
];

struct HexRecord {
    address: u32,
    payload: Vec<u8>,
}

/// Parse one `:<6-hex-addr><2n-hex-payload>` record, ignoring `\r`/`\n`.
fn parse_record(line: &[u8]) -> Result<HexRecord> {
    if line.is_empty() || line[0] != b':' {
        return Err(Error::DataFormat("firmware record missing ':' marker".into()));
    }
    let digits = &line[1..];
    if digits.len() < 6 || digits.len() % 2 != 0 {
        return Err(Error::DataFormat("firmware record has malformed length".into()));
    }

    let mut addr_bytes = [0u8; 3];
    for (i, byte) in addr_bytes.iter_mut().enumerate() {
        *byte = bytes::hex2bin(digits[2 * i], digits[2 * i + 1])
            .ok_or_else(|| Error::DataFormat("firmware record address is not hex".into()))?;
    }
    let address = ((addr_bytes[0] as u32) << 16) | ((addr_bytes[1] as u32) << 8) | addr_bytes[2] as u32;

    let payload_digits = &digits[6..];
    let mut payload = Vec::with_capacity(payload_digits.len() / 2);
    for chunk in payload_digits.chunks(2) {
        payload.push(
            bytes::hex2bin(chunk[0], chunk[1])
                .ok_or_else(|| Error::DataFormat("firmware record payload is not hex".into()))?,
        );
    }

    Ok(HexRecord { address, payload })
}

fn split_records(hex_image: &[u8]) -> Vec<&[u8]> {
    hex_image
        .split(|&b| b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            line
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn aes_encrypt_block(key: &Aes128, block: &[u8; BLOCK_LEN]) -> [u8; BLOCK_LEN] {
    let mut buf = GenericArray::clone_from_slice(block);
    key.encrypt_block(&mut buf);
    buf.into()
}

/// Decrypt and verify an OSTC3 firmware hex-record image: the first
/// record is a 16-byte IV at address 0, every subsequent
/// 16-byte record is a ciphertext block decrypted with the
/// ciphertext-feedback construction, and a trailing 4-byte record carries
/// the little-endian expected Fletcher checksum of the full plaintext.
pub fn decrypt_hex_image(hex_image: &[u8]) -> Result<Vec<u8>> {
    let lines = split_records(hex_image);
    if lines.is_empty() {
        return Err(Error::DataFormat("empty firmware image".into()));
    }

    let mut records = Vec::with_capacity(lines.len());
    for line in lines {
        records.push(parse_record(line)?);
    }

    let iv_record = &records[0];
    if iv_record.address != 0 || iv_record.payload.len() != BLOCK_LEN {
        return Err(Error::DataFormat("firmware image missing leading IV record".into()));
    }

    let (checksum_records, block_records) = records[1..]
        .split_last()
        .ok_or_else(|| Error::DataFormat("firmware image has no ciphertext blocks".into()))?;
    if checksum_records.payload.len() != 4 {
        return Err(Error::DataFormat("firmware trailer is not a 4-byte checksum".into()));
    }
    let expected_checksum = bytes::u32_le(&checksum_records.payload);

    let key = Aes128::new(GenericArray::from_slice(&VENDOR_KEY));
    let mut iv = [0u8; BLOCK_LEN];
    iv.copy_from_slice(&iv_record.payload);
    let mut key_block = aes_encrypt_block(&key, &iv);

    let mut plaintext = Vec::with_capacity(block_records.len() * BLOCK_LEN);
    for record in block_records {
        if record.payload.len() != BLOCK_LEN {
            return Err(Error::DataFormat("firmware ciphertext record is not 16 bytes".into()));
        }
        let mut ciphertext = [0u8; BLOCK_LEN];
        ciphertext.copy_from_slice(&record.payload);

        for (p, (c, k)) in plaintext_slot(&mut plaintext).iter_mut().zip(ciphertext.iter().zip(key_block.iter())) {
            *p = c ^ k;
        }

        key_block = aes_encrypt_block(&key, &ciphertext);
    }

    let actual_checksum = checksum::fletcher32_variant(&plaintext);
    if actual_checksum != expected_checksum {
        return Err(Error::DataFormat("firmware checksum mismatch".into()));
    }

    Ok(plaintext)
}

/// Push one zeroed block onto `plaintext` and hand back a mutable view of
/// it, so the XOR loop above can write through a fixed-size slice without
/// a second allocation.
fn plaintext_slot(plaintext: &mut Vec<u8>) -> &mut [u8] {
    let start = plaintext.len();
    plaintext.resize(start + BLOCK_LEN, 0);
    &mut plaintext[start..start + BLOCK_LEN]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_record(address: u32, payload: &[u8]) -> String {
        let mut s = format!(":{:06X}", address);
        for b in payload {
            s.push_str(&format!("{:02X}", b));
        }
        s
    }

    fn build_image(iv: [u8; BLOCK_LEN], plaintext_blocks: &[[u8; BLOCK_LEN]]) -> String {
        let key = Aes128::new(GenericArray::from_slice(&VENDOR_KEY));
        let mut lines = vec![hex_record(0, &iv)];

        let mut key_block = aes_encrypt_block(&key, &iv);
        let mut full_plaintext = Vec::new();
        let mut address = BLOCK_LEN as u32;
        for block in plaintext_blocks {
            let mut ciphertext = [0u8; BLOCK_LEN];
            for i in 0..BLOCK_LEN {
                ciphertext[i] = block[i] ^ key_block[i];
            }
            lines.push(hex_record(address, &ciphertext));
            full_plaintext.extend_from_slice(block);
            key_block = aes_encrypt_block(&key, &ciphertext);
            address += BLOCK_LEN as u32;
        }

        let checksum = checksum::fletcher32_variant(&full_plaintext);
        lines.push(hex_record(address, &checksum.to_le_bytes()));

        lines.join("\r\n")
    }

    #[test]
    fn decrypts_and_verifies_a_single_block_image() {
        let iv = [0x11u8; BLOCK_LEN];
        let plaintext_block = {
            let mut b = [0u8; BLOCK_LEN];
            for (i, v) in b.iter_mut().enumerate() {
                *v = i as u8;
            }
            b
        };
        let image = build_image(iv, &[plaintext_block]);

        let decrypted = decrypt_hex_image(image.as_bytes()).unwrap();
        assert_eq!(decrypted, plaintext_block.to_vec());
    }

    #[test]
    fn bad_checksum_is_data_format_error() {
        let iv = [0x22u8; BLOCK_LEN];
        let block = [0x00u8; BLOCK_LEN];
        let mut image = build_image(iv, &[block]);
        // Flip a bit in the trailing checksum record.
        let last_char_idx = image.rfind('0').unwrap();
        image.replace_range(last_char_idx..last_char_idx + 1, "1");

        assert!(matches!(decrypt_hex_image(image.as_bytes()), Err(Error::DataFormat(_))));
    }

    #[test]
    fn unexpected_address_on_leading_record_is_data_format_error() {
        let bad = ":000010FF";
        assert!(matches!(decrypt_hex_image(bad.as_bytes()), Err(Error::DataFormat(_))));
    }
}
