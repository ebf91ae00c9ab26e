//! Windows PE attribute certificate table access
//!
//! Authenticode stores its PKCS#7 SignedData in the attribute certificate
//! table. The security data directory points at that table by raw file
//! offset (not RVA), and the table is a sequence of 8-byte aligned
//! `WIN_CERTIFICATE` records.

use anyhow::{Context, Result, bail, ensure};
use log::{debug, trace, warn};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::constants::{
    COFF_HEADER_SIZE, COFF_OPT_HEADER_SIZE_OFFSET, DATA_DIRECTORY_ENTRY_SIZE, DOS_MAGIC,
    E_LFANEW_OFFSET, MAX_CERTIFICATE_TABLE, MAX_HEADER_READ, PE_SIGNATURE, PE32_MAGIC,
    PE32_PLUS_MAGIC, PE32_PLUS_RVA_COUNT_OFFSET, PE32_RVA_COUNT_OFFSET, SECURITY_DIRECTORY_INDEX,
    WIN_CERT_TYPE_PKCS_SIGNED_DATA, WIN_CERTIFICATE_ALIGNMENT, WIN_CERTIFICATE_HEADER_SIZE,
};

/// Location of the attribute certificate table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityDirectory {
    /// Raw file offset of the table
    pub offset: u64,
    /// Table size in bytes
    pub size: u32,
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

/// Check if data starts with the "MZ" DOS signature.
pub fn is_pe_executable(data: &[u8]) -> bool {
    data.starts_with(DOS_MAGIC)
}

/// Read and validate the PE header offset (e_lfanew at 0x3C).
pub fn get_pe_header_offset(data: &[u8]) -> Option<usize> {
    let pe_offset = read_u32(data, E_LFANEW_OFFSET)? as usize;

    let signature = data.get(pe_offset..pe_offset.checked_add(PE_SIGNATURE.len())?)?;
    if signature != PE_SIGNATURE {
        warn!(
            "Invalid PE signature at offset 0x{:x}: got {:?}",
            pe_offset,
            String::from_utf8_lossy(signature)
        );
        return None;
    }

    Some(pe_offset)
}

/// Locate the security data directory in the PE headers.
///
/// Returns `Ok(None)` for a well-formed image that carries no signature.
pub fn security_directory(headers: &[u8]) -> Result<Option<SecurityDirectory>> {
    ensure!(is_pe_executable(headers), "missing MZ signature");
    let pe_offset = get_pe_header_offset(headers).context("missing PE signature")?;

    let coff_offset = pe_offset + PE_SIGNATURE.len();
    let opt_size = read_u16(headers, coff_offset + COFF_OPT_HEADER_SIZE_OFFSET)
        .context("truncated COFF header")? as usize;
    let opt_offset = coff_offset + COFF_HEADER_SIZE;
    let opt_end = opt_offset + opt_size;

    let magic = read_u16(headers, opt_offset).context("truncated optional header")?;
    let rva_count_offset = match magic {
        PE32_MAGIC => PE32_RVA_COUNT_OFFSET,
        PE32_PLUS_MAGIC => PE32_PLUS_RVA_COUNT_OFFSET,
        other => bail!("unknown optional header magic 0x{other:x}"),
    };
    trace!("PE optional header magic=0x{magic:x} at 0x{opt_offset:x}, size={opt_size}");

    let rva_count = read_u32(headers, opt_offset + rva_count_offset)
        .context("truncated optional header")? as usize;
    if rva_count <= SECURITY_DIRECTORY_INDEX {
        debug!("PE image has only {rva_count} data directories");
        return Ok(None);
    }

    let entry_offset =
        opt_offset + rva_count_offset + 4 + SECURITY_DIRECTORY_INDEX * DATA_DIRECTORY_ENTRY_SIZE;
    ensure!(
        entry_offset + DATA_DIRECTORY_ENTRY_SIZE <= opt_end,
        "security directory lies outside the optional header"
    );

    let offset = read_u32(headers, entry_offset).context("truncated data directory")?;
    let size = read_u32(headers, entry_offset + 4).context("truncated data directory")?;

    if offset == 0 || size == 0 {
        debug!("PE image has an empty security directory");
        return Ok(None);
    }

    Ok(Some(SecurityDirectory {
        offset: u64::from(offset),
        size,
    }))
}

/// Return the first PKCS#7 SignedData blob in an attribute certificate table.
pub fn pkcs7_from_certificate_table(table: &[u8]) -> Result<&[u8]> {
    let mut pos = 0usize;

    while pos + WIN_CERTIFICATE_HEADER_SIZE <= table.len() {
        let length = read_u32(table, pos).context("truncated WIN_CERTIFICATE")? as usize;
        let revision = read_u16(table, pos + 4).context("truncated WIN_CERTIFICATE")?;
        let cert_type = read_u16(table, pos + 6).context("truncated WIN_CERTIFICATE")?;

        ensure!(
            length >= WIN_CERTIFICATE_HEADER_SIZE && pos + length <= table.len(),
            "WIN_CERTIFICATE at 0x{pos:x} has invalid length {length}"
        );
        trace!("WIN_CERTIFICATE at 0x{pos:x}: length={length}, revision=0x{revision:x}, type={cert_type}");

        if cert_type == WIN_CERT_TYPE_PKCS_SIGNED_DATA {
            return table
                .get(pos + WIN_CERTIFICATE_HEADER_SIZE..pos + length)
                .context("WIN_CERTIFICATE body out of range");
        }

        pos += length.next_multiple_of(WIN_CERTIFICATE_ALIGNMENT);
    }

    bail!("no PKCS#7 signed data in certificate table")
}

/// Read the embedded signed message from a file.
///
/// PE images yield the PKCS#7 blob of their certificate table. Files that
/// are not PE images but look like a DER SEQUENCE are returned whole, so
/// bare `.p7s`-style signed messages are accepted too.
pub fn read_embedded_message(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    let file_size = file.metadata()?.len();

    let mut headers = Vec::new();
    (&mut file)
        .take(MAX_HEADER_READ as u64)
        .read_to_end(&mut headers)?;

    if is_pe_executable(&headers) {
        let directory = security_directory(&headers)?.context("PE image is not signed")?;
        ensure!(
            directory.size <= MAX_CERTIFICATE_TABLE,
            "certificate table too large ({} bytes)",
            directory.size
        );
        ensure!(
            directory.offset + u64::from(directory.size) <= file_size,
            "certificate table extends past end of file (truncated download?)"
        );

        file.seek(SeekFrom::Start(directory.offset))?;
        let mut table = vec![0u8; directory.size as usize];
        file.read_exact(&mut table)?;

        debug!(
            "Read {} byte certificate table from {path:?} at 0x{:x}",
            table.len(),
            directory.offset
        );
        return Ok(pkcs7_from_certificate_table(&table)?.to_vec());
    }

    if headers.first() == Some(&0x30) {
        ensure!(
            file_size <= u64::from(MAX_CERTIFICATE_TABLE),
            "file too large to be a bare signed message"
        );
        file.seek(SeekFrom::Start(0))?;
        let mut message = Vec::with_capacity(file_size as usize);
        file.read_to_end(&mut message)?;
        return Ok(message);
    }

    bail!("{path:?} has no embedded signed message")
}

#[cfg(test)]
mod tests {
    use super::super::test_support::synthetic_pe;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_pe_executable() {
        assert!(is_pe_executable(b"MZ\x90\x00"));
        assert!(!is_pe_executable(b"\x7fELF"));
        assert!(!is_pe_executable(b"M"));
    }

    #[test]
    fn test_get_pe_header_offset() {
        let image = synthetic_pe(b"message");
        assert_eq!(get_pe_header_offset(&image), Some(0x80));

        let mut broken = image.clone();
        broken[0x80] = b'X';
        assert_eq!(get_pe_header_offset(&broken), None);

        assert_eq!(get_pe_header_offset(b"MZ"), None);
    }

    #[test]
    fn test_security_directory_points_at_table() {
        let image = synthetic_pe(b"message");
        let directory = security_directory(&image).unwrap().unwrap();
        assert_eq!(directory.offset, 0x200);
        assert_eq!(directory.size, 16);
    }

    #[test]
    fn test_unsigned_image_has_no_directory() {
        let mut image = synthetic_pe(b"message");
        // Zero the security directory entry
        image[0x128..0x130].copy_from_slice(&[0u8; 8]);
        assert_eq!(security_directory(&image).unwrap(), None);
    }

    #[test]
    fn test_certificate_table_skips_other_types() {
        let mut table = Vec::new();
        // X.509 certificate record (type 1), 12 bytes padded to 16
        table.extend_from_slice(&12u32.to_le_bytes());
        table.extend_from_slice(&0x0200u16.to_le_bytes());
        table.extend_from_slice(&1u16.to_le_bytes());
        table.extend_from_slice(b"x509");
        table.extend_from_slice(&[0u8; 4]);
        // PKCS#7 record
        table.extend_from_slice(&13u32.to_le_bytes());
        table.extend_from_slice(&0x0200u16.to_le_bytes());
        table.extend_from_slice(&2u16.to_le_bytes());
        table.extend_from_slice(b"pkcs7");
        table.extend_from_slice(&[0u8; 3]);

        assert_eq!(pkcs7_from_certificate_table(&table).unwrap(), b"pkcs7");
    }

    #[test]
    fn test_certificate_table_rejects_bad_length() {
        let mut table = Vec::new();
        table.extend_from_slice(&64u32.to_le_bytes());
        table.extend_from_slice(&0x0200u16.to_le_bytes());
        table.extend_from_slice(&2u16.to_le_bytes());
        assert!(pkcs7_from_certificate_table(&table).is_err());
    }

    #[test]
    fn test_read_embedded_message() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("package.exe");
        fs::write(&path, synthetic_pe(b"SIGNED:2023-04-01T10:15:30Z")).unwrap();

        let message = read_embedded_message(&path).unwrap();
        assert_eq!(message, b"SIGNED:2023-04-01T10:15:30Z");
    }

    #[test]
    fn test_truncated_download_has_no_message() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("package.exe");
        let image = synthetic_pe(b"SIGNED:2023-04-01T10:15:30Z");
        fs::write(&path, &image[..0x210]).unwrap();

        assert!(read_embedded_message(&path).is_err());
    }

    #[test]
    fn test_bare_der_file_is_its_own_message() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("message.p7s");
        fs::write(&path, [0x30, 0x03, 0x02, 0x01, 0x01]).unwrap();
        assert_eq!(
            read_embedded_message(&path).unwrap(),
            vec![0x30, 0x03, 0x02, 0x01, 0x01]
        );

        let text = temp_dir.path().join("readme.txt");
        fs::write(&text, "hello").unwrap();
        assert!(read_embedded_message(&text).is_err());
    }
}
