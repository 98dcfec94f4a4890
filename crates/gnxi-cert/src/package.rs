//! A certificate package: key material, certificates, and the gNOI
//! CertificateInfo view of it.

use std::path::PathBuf;

use gnxi_core::{Error, Result};
use gnxi_proto::gnoi::certificate::{Certificate, CertificateInfo, CertificateType};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use x509_parser::pem::{parse_x509_pem, Pem};

pub const CERT_FILE_NAME: &str = "target.crt";
pub const KEY_FILE_NAME: &str = "target.key";
pub const CA_CERT_FILE_NAME: &str = "ca.crt";

/// One certificate package. A package is either finalized (all fields
/// populated, files on disk) or in-construction (only the private key
/// present).
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub id: String,
    pub finalized: bool,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
    /// PEM of the signed leaf certificate.
    pub certificate_pem: Vec<u8>,
    /// PEM of the private key (PKCS#8).
    pub private_key_pem: Vec<u8>,
    /// Concatenated PEM bundle of the CA certificates; doubles as the peer
    /// trust pool handed to the TLS listener.
    pub ca_bundle_pem: Vec<u8>,
    pub private_key: Option<RsaPrivateKey>,
    pub cert_info: Vec<CertificateInfo>,
}

impl Package {
    /// New in-construction package around a freshly generated key.
    pub fn in_construction(private_key: RsaPrivateKey) -> Result<Self> {
        let private_key_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| Error::certificate(format!("failed to encode private key: {}", e)))?
            .as_bytes()
            .to_vec();
        Ok(Self {
            finalized: false,
            private_key: Some(private_key),
            private_key_pem,
            ..Default::default()
        })
    }

    /// Create a PEM certificate signing request for this package's key,
    /// signed with SHA-256/RSA.
    pub fn create_csr(
        &self,
        country: &str,
        organization: &str,
        organizational_unit: &str,
        common_name: &str,
    ) -> Result<Vec<u8>> {
        if self.private_key.is_none() {
            return Err(Error::certificate("package has no private key"));
        }

        let key_der = self
            .private_key
            .as_ref()
            .unwrap()
            .to_pkcs8_der()
            .map_err(|e| Error::certificate(format!("failed to encode private key: {}", e)))?;
        let key_pair = rcgen::KeyPair::try_from(key_der.as_bytes())
            .map_err(|e| Error::certificate(format!("failed to load key pair: {}", e)))?;

        let mut params = rcgen::CertificateParams::default();
        let mut dn = rcgen::DistinguishedName::new();
        dn.push(rcgen::DnType::CountryName, country);
        dn.push(rcgen::DnType::OrganizationName, organization);
        dn.push(rcgen::DnType::OrganizationalUnitName, organizational_unit);
        dn.push(rcgen::DnType::CommonName, common_name);
        params.distinguished_name = dn;

        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| Error::certificate(format!("failed to create CSR: {}", e)))?;
        let pem = csr
            .pem()
            .map_err(|e| Error::certificate(format!("failed to encode CSR: {}", e)))?;
        Ok(pem.into_bytes())
    }

    /// Load the signed leaf certificate, populating the CertInfo view.
    pub fn load_signed_certificate(&mut self, pem: &[u8]) -> Result<()> {
        let (_, parsed) = parse_x509_pem(pem)
            .map_err(|e| Error::certificate(format!("failed to parse certificate PEM: {}", e)))?;
        parsed
            .parse_x509()
            .map_err(|e| Error::certificate(format!("failed to parse certificate: {}", e)))?;

        self.certificate_pem = pem.to_vec();
        self.cert_info = vec![CertificateInfo {
            certificate_id: self.id.clone(),
            certificate: Some(Certificate {
                r#type: CertificateType::CtX509 as i32,
                certificate: pem.to_vec(),
            }),
            modification_time: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        }];
        Ok(())
    }

    /// Load and validate the CA bundle used as the peer trust pool.
    pub fn load_ca_certificates(&mut self, pem: &[u8]) -> Result<()> {
        let mut count = 0;
        for entry in Pem::iter_from_buffer(pem) {
            let entry = entry
                .map_err(|e| Error::certificate(format!("failed to parse CA PEM: {}", e)))?;
            entry
                .parse_x509()
                .map_err(|e| Error::certificate(format!("failed to parse CA certificate: {}", e)))?;
            count += 1;
        }
        if count == 0 {
            return Err(Error::certificate("no CA certificates found in bundle"));
        }
        self.ca_bundle_pem = pem.to_vec();
        Ok(())
    }
}
