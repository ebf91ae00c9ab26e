//! CMS / PKCS#7 signed message verification

use anyhow::{Context, Result, anyhow, bail, ensure};
use chrono::{DateTime, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{ObjectIdentifier, SetOfVec};
use der::{Any, Decode, Encode, SliceReader};
use log::{debug, trace};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::Digest;
use std::fmt;
use x509_cert::Certificate;
use x509_cert::attr::Attribute;
use x509_cert::time::Time;

use super::constants::{
    OID_COUNTER_SIGNATURE, OID_MESSAGE_DIGEST, OID_RSA_ENCRYPTION, OID_SHA1, OID_SHA1_WITH_RSA,
    OID_SHA256, OID_SHA256_WITH_RSA, OID_SHA384, OID_SHA384_WITH_RSA, OID_SHA512,
    OID_SHA512_WITH_RSA, OID_SIGNED_DATA, OID_SIGNING_TIME,
};

/// Outcome of verifying a signed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// Every signature in the message verified
    pub valid: bool,
    /// Signing time from a verified counter-signature
    pub timestamp: Option<DateTime<Utc>>,
}

impl Verification {
    pub const fn invalid() -> Self {
        Self {
            valid: false,
            timestamp: None,
        }
    }
}

/// Verifies an encoded signed message.
///
/// `Err` means the message could not be processed at all; callers treat it
/// the same as an invalid signature.
pub trait MessageVerifier: Send + Sync + fmt::Debug {
    fn verify(&self, message: &[u8]) -> Result<Verification>;
}

/// RSA digest algorithms accepted in signer infos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestKind {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestKind {
    fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        const KNOWN: [(ObjectIdentifier, DigestKind); 4] = [
            (OID_SHA1, DigestKind::Sha1),
            (OID_SHA256, DigestKind::Sha256),
            (OID_SHA384, DigestKind::Sha384),
            (OID_SHA512, DigestKind::Sha512),
        ];

        KNOWN
            .iter()
            .find(|(known, _)| known == oid)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| anyhow!("unsupported digest algorithm {oid}"))
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha384 => sha2::Sha384::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    fn pkcs1v15(&self) -> Pkcs1v15Sign {
        match self {
            Self::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
            Self::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
            Self::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
            Self::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        }
    }
}

/// Verifier for DER-encoded CMS SignedData (Authenticode signatures).
///
/// Checks every signer's message digest and RSA PKCS#1 v1.5 signature
/// against the certificate embedded in the message. Certificate chains are
/// not built; trust is limited to the signature itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct CmsVerifier;

impl MessageVerifier for CmsVerifier {
    fn verify(&self, message: &[u8]) -> Result<Verification> {
        let signed_data = decode_signed_data(message)?;

        let content = signed_data
            .encap_content_info
            .econtent
            .as_ref()
            .map(Any::value)
            .context("signed message has detached content")?;
        let certificates = embedded_certificates(&signed_data);
        trace!(
            "SignedData: {} signer(s), {} certificate(s), {} content bytes",
            signed_data.signer_infos.0.len(),
            certificates.len(),
            content.len()
        );

        let primary = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .context("signed message has no signers")?;

        for signer in signed_data.signer_infos.0.iter() {
            if let Err(e) = verify_signer(signer, content, &certificates) {
                debug!("Signature verification failed: {e:#}");
                return Ok(Verification::invalid());
            }
        }

        let timestamp = counter_signing_time(primary, &certificates);
        debug!("Signature verified, counter-signed time: {timestamp:?}");

        Ok(Verification {
            valid: true,
            timestamp,
        })
    }
}

/// Decode a ContentInfo wrapping SignedData.
///
/// Anything after the outer DER value is ignored; certificate tables pad
/// their records with zeros.
pub fn decode_signed_data(message: &[u8]) -> Result<SignedData> {
    let mut reader = SliceReader::new(message).context("signed message too large")?;
    let content_info = ContentInfo::decode(&mut reader).context("malformed ContentInfo")?;

    ensure!(
        content_info.content_type == OID_SIGNED_DATA,
        "message is not CMS signedData (content type {})",
        content_info.content_type
    );

    let encoded = content_info.content.to_der()?;
    SignedData::from_der(&encoded).context("malformed SignedData")
}

fn embedded_certificates(signed_data: &SignedData) -> Vec<&Certificate> {
    signed_data
        .certificates
        .as_ref()
        .map(|set| {
            set.0
                .iter()
                .filter_map(|choice| match choice {
                    CertificateChoices::Certificate(cert) => Some(cert),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn find_attribute<'a>(
    attributes: &'a SetOfVec<Attribute>,
    oid: &ObjectIdentifier,
) -> Option<&'a Any> {
    attributes
        .iter()
        .filter(|attr| attr.oid == *oid)
        .flat_map(|attr| attr.values.iter())
        .next()
}

fn signer_certificate<'a>(
    sid: &SignerIdentifier,
    certificates: &[&'a Certificate],
) -> Result<&'a Certificate> {
    match sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => certificates
            .iter()
            .copied()
            .find(|cert| {
                cert.tbs_certificate.issuer == id.issuer
                    && cert.tbs_certificate.serial_number == id.serial_number
            })
            .context("signer certificate not present in message"),
        SignerIdentifier::SubjectKeyIdentifier(_) => {
            bail!("signers identified by subject key identifier are not supported")
        }
    }
}

fn check_signature_algorithm(oid: &ObjectIdentifier) -> Result<()> {
    const RSA_ALGORITHMS: [ObjectIdentifier; 5] = [
        OID_RSA_ENCRYPTION,
        OID_SHA1_WITH_RSA,
        OID_SHA256_WITH_RSA,
        OID_SHA384_WITH_RSA,
        OID_SHA512_WITH_RSA,
    ];

    ensure!(
        RSA_ALGORITHMS.contains(oid),
        "unsupported signature algorithm {oid}"
    );
    Ok(())
}

/// Verify one signer over `content`.
///
/// The signed attributes must carry a message digest of `content`, and the
/// signature covers the DER SET OF encoding of those attributes.
fn verify_signer(signer: &SignerInfo, content: &[u8], certificates: &[&Certificate]) -> Result<()> {
    let digest = DigestKind::from_oid(&signer.digest_alg.oid)?;
    let signed_attrs = signer
        .signed_attrs
        .as_ref()
        .context("signer has no signed attributes")?;

    let expected = find_attribute(signed_attrs, &OID_MESSAGE_DIGEST)
        .context("signer has no message digest attribute")?;
    let actual = digest.hash(content);
    ensure!(
        expected.value() == actual.as_slice(),
        "message digest mismatch: expected {}, computed {}",
        hex::encode(expected.value()),
        hex::encode(&actual)
    );

    check_signature_algorithm(&signer.signature_algorithm.oid)?;
    let certificate = signer_certificate(&signer.sid, certificates)?;
    let key_bytes = certificate
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();
    let public_key = RsaPublicKey::from_pkcs1_der(key_bytes)
        .map_err(|e| anyhow!("signer key is not an RSA public key: {e}"))?;

    let signed_bytes = signed_attrs.to_der()?;
    public_key
        .verify(
            digest.pkcs1v15(),
            &digest.hash(&signed_bytes),
            signer.signature.as_bytes(),
        )
        .map_err(|e| anyhow!("RSA signature check failed: {e}"))
}

/// Signing time of the first verified counter-signer of `signer`
fn counter_signing_time(
    signer: &SignerInfo,
    certificates: &[&Certificate],
) -> Option<DateTime<Utc>> {
    let unsigned_attrs = signer.unsigned_attrs.as_ref()?;

    let counter_signers = unsigned_attrs
        .iter()
        .filter(|attr| attr.oid == OID_COUNTER_SIGNATURE)
        .flat_map(|attr| attr.values.iter());

    for value in counter_signers {
        let counter_signer = match value
            .to_der()
            .ok()
            .and_then(|der| SignerInfo::from_der(&der).ok())
        {
            Some(counter_signer) => counter_signer,
            None => {
                debug!("Skipping malformed counter-signature");
                continue;
            }
        };

        // A counter-signature signs the primary signature value
        if let Err(e) = verify_signer(&counter_signer, signer.signature.as_bytes(), certificates) {
            debug!("Counter-signature not trusted: {e:#}");
            continue;
        }

        let signing_time = counter_signer
            .signed_attrs
            .as_ref()
            .and_then(|attrs| find_attribute(attrs, &OID_SIGNING_TIME))
            .and_then(decode_signing_time);

        if signing_time.is_some() {
            return signing_time;
        }
    }

    None
}

/// Decode a PKCS#9 signing time (UTCTime or GeneralizedTime)
fn decode_signing_time(value: &Any) -> Option<DateTime<Utc>> {
    let encoded = value.to_der().ok()?;
    let time = Time::from_der(&encoded).ok()?;
    let seconds = i64::try_from(time.to_unix_duration().as_secs()).ok()?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // ContentInfo { id-data, [0] OCTET STRING 00 }
    const DATA_CONTENT_INFO: [u8; 18] = [
        0x30, 0x10, 0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01, 0xA0, 0x03,
        0x04, 0x01, 0x00,
    ];

    /// SignedData over `COUNTERSIGNED_CONTENT`: one RSA/SHA-256 signer,
    /// counter-signed by a second certificate at 2023-04-01 10:15:30 UTC
    const COUNTERSIGNED: &[u8] = include_bytes!("testdata/countersigned.p7");
    const COUNTERSIGNED_CONTENT: &[u8] = b"patchvault fixture content: KB2760411 x64";
    const COUNTERSIGNED_TIME: &[u8] = b"230401101530Z";

    fn position_of(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
            .unwrap()
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(CmsVerifier.verify(b"not a signed message").is_err());
        assert!(CmsVerifier.verify(&[]).is_err());
    }

    #[test]
    fn test_counter_signed_message_verifies() {
        let verification = CmsVerifier.verify(COUNTERSIGNED).unwrap();
        assert_eq!(
            verification,
            Verification {
                valid: true,
                timestamp: Some(Utc.with_ymd_and_hms(2023, 4, 1, 10, 15, 30).unwrap()),
            }
        );
    }

    #[test]
    fn test_altered_content_is_invalid() {
        let mut message = COUNTERSIGNED.to_vec();
        let at = position_of(&message, COUNTERSIGNED_CONTENT);
        message[at] ^= 0x01;

        assert_eq!(CmsVerifier.verify(&message).unwrap(), Verification::invalid());
    }

    #[test]
    fn test_altered_counter_signature_drops_timestamp() {
        let mut message = COUNTERSIGNED.to_vec();
        // 2023-04-01 becomes 2023-04-02 inside the counter-signer's signed attributes
        let at = position_of(&message, COUNTERSIGNED_TIME);
        message[at + 5] = b'2';

        let verification = CmsVerifier.verify(&message).unwrap();
        assert!(verification.valid);
        assert_eq!(verification.timestamp, None);
    }

    #[test]
    fn test_counter_signer_must_sign_primary_signature() {
        let signed_data = decode_signed_data(COUNTERSIGNED).unwrap();
        let certificates = embedded_certificates(&signed_data);
        let mut primary = signed_data.signer_infos.0.iter().next().unwrap().clone();
        assert!(counter_signing_time(&primary, &certificates).is_some());

        let mut signature = primary.signature.as_bytes().to_vec();
        signature[0] ^= 0xFF;
        primary.signature = der::asn1::OctetString::new(signature).unwrap();
        assert_eq!(counter_signing_time(&primary, &certificates), None);
    }

    #[test]
    fn test_non_signed_data_is_rejected() {
        let err = decode_signed_data(&DATA_CONTENT_INFO).unwrap_err();
        assert!(format!("{err:#}").contains("signedData"));
    }

    #[test]
    fn test_trailing_padding_is_ignored() {
        let mut padded = DATA_CONTENT_INFO.to_vec();
        padded.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        // Fails on the content type, not on the trailing zeros
        let err = decode_signed_data(&padded).unwrap_err();
        assert!(format!("{err:#}").contains("signedData"));
    }

    #[test]
    fn test_decode_utc_signing_time() {
        let mut encoded = vec![0x17, 0x0D];
        encoded.extend_from_slice(b"230401101530Z");
        let value = Any::from_der(&encoded).unwrap();

        assert_eq!(
            decode_signing_time(&value),
            Some(Utc.with_ymd_and_hms(2023, 4, 1, 10, 15, 30).unwrap())
        );
    }

    #[test]
    fn test_decode_generalized_signing_time() {
        let mut encoded = vec![0x18, 0x0F];
        encoded.extend_from_slice(b"20500101000000Z");
        let value = Any::from_der(&encoded).unwrap();

        assert_eq!(
            decode_signing_time(&value),
            Some(Utc.with_ymd_and_hms(2050, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_signing_time_rejects_other_types() {
        let value = Any::from_der(&[0x04, 0x01, 0x00]).unwrap();
        assert_eq!(decode_signing_time(&value), None);
    }

    #[test]
    fn test_digest_kinds() {
        assert_eq!(DigestKind::from_oid(&OID_SHA256).unwrap(), DigestKind::Sha256);
        assert!(DigestKind::from_oid(&OID_SIGNING_TIME).is_err());
        assert_eq!(
            hex::encode(DigestKind::Sha1.hash(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(DigestKind::Sha512.hash(b"abc").len(), 64);
    }

    #[test]
    fn test_signature_algorithms() {
        assert!(check_signature_algorithm(&OID_SHA256_WITH_RSA).is_ok());
        assert!(check_signature_algorithm(&OID_RSA_ENCRYPTION).is_ok());
        assert!(check_signature_algorithm(&OID_SHA256).is_err());
    }
}
