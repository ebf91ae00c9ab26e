//! PE layout and ASN.1 object identifiers used by signature inspection

use der::asn1::ObjectIdentifier;

// =================================
// PE / COFF layout
// =================================
pub const DOS_MAGIC: &[u8; 2] = b"MZ";
pub const PE_SIGNATURE: &[u8; 4] = b"PE\x00\x00";
pub const E_LFANEW_OFFSET: usize = 0x3C;
pub const COFF_HEADER_SIZE: usize = 20;
pub const COFF_OPT_HEADER_SIZE_OFFSET: usize = 16;

pub const PE32_MAGIC: u16 = 0x10b;
pub const PE32_PLUS_MAGIC: u16 = 0x20b;

/// Offset of NumberOfRvaAndSizes inside the optional header
pub const PE32_RVA_COUNT_OFFSET: usize = 92;
pub const PE32_PLUS_RVA_COUNT_OFFSET: usize = 108;

/// Data directory entries are (VirtualAddress, Size) pairs
pub const DATA_DIRECTORY_ENTRY_SIZE: usize = 8;

/// IMAGE_DIRECTORY_ENTRY_SECURITY; its "address" is a raw file offset
pub const SECURITY_DIRECTORY_INDEX: usize = 4;

/// Headers are read from this prefix of the file
pub const MAX_HEADER_READ: usize = 64 * 1024;

/// Upper bound for an attribute certificate table
pub const MAX_CERTIFICATE_TABLE: u32 = 16 * 1024 * 1024;

// =================================
// WIN_CERTIFICATE
// =================================
pub const WIN_CERTIFICATE_HEADER_SIZE: usize = 8;
pub const WIN_CERT_TYPE_PKCS_SIGNED_DATA: u16 = 0x0002;
pub const WIN_CERTIFICATE_ALIGNMENT: usize = 8;

// =================================
// CMS / PKCS#9
// =================================
pub const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
pub const OID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
pub const OID_COUNTER_SIGNATURE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.6");

// Digest algorithms
pub const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
pub const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
pub const OID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
pub const OID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

// Signature algorithms accepted for RSA PKCS#1 v1.5
pub const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
pub const OID_SHA1_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
pub const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
pub const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
pub const OID_SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
