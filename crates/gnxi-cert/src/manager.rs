//! The certificate manager: a keyed collection of certificate packages
//! persisted under a root path, with exactly one active package.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use gnxi_core::{Error, Result};
use gnxi_proto::gnoi::certificate::CertificateInfo;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use tracing::info;
use x509_parser::pem::parse_x509_pem;

use crate::package::{Package, CA_CERT_FILE_NAME, CERT_FILE_NAME, KEY_FILE_NAME};

/// ID of the package imported and activated at startup.
pub const DEFAULT_CERT_ID: &str = "c5e5a1cb-8e1f-43c1-be4a-ab8e513fc667";

const DEFAULT_KEY_SIZE: usize = 4096;

/// Name of the directory mirroring the active package.
pub const ACTIVE_DIR_NAME: &str = "active";

#[derive(Default)]
struct Inner {
    collection: HashMap<String, Arc<Package>>,
    active: Option<String>,
}

/// Certificate package collection rooted at a filesystem path. One
/// reader-writer lock protects the collection and the active pointer.
pub struct Manager {
    root: PathBuf,
    inner: RwLock<Inner>,
}

impl Manager {
    /// Empty manager over the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), inner: RwLock::new(Inner::default()) }
    }

    /// Manager with the default package imported from disk and activated.
    pub fn with_default_package(root: impl Into<PathBuf>) -> Result<Self> {
        let manager = Self::new(root);
        manager.import_from_path(DEFAULT_CERT_ID)?;
        manager.activate(DEFAULT_CERT_ID)?;
        Ok(manager)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn active_dir(&self) -> PathBuf {
        self.root.join(ACTIVE_DIR_NAME)
    }

    /// New in-construction package holding a freshly generated key.
    pub fn initialize_package(&self) -> Result<Package> {
        let key = generate_private_key(DEFAULT_KEY_SIZE)?;
        Package::in_construction(key)
    }

    /// Write the package files under `<root>/<id>/`, load the key pair back
    /// from disk, mark the package finalized, and insert it into the
    /// collection. A failed write leaves the collection unchanged.
    pub fn finalize(&self, mut package: Package) -> Result<()> {
        if package.id.is_empty() {
            return Err(Error::certificate("cannot finalize package without an id"));
        }
        if package.private_key.is_none() {
            return Err(Error::certificate("cannot finalize package without a private key"));
        }
        if package.certificate_pem.is_empty() {
            return Err(Error::certificate("cannot finalize package without a certificate"));
        }
        if package.ca_bundle_pem.is_empty() {
            return Err(Error::certificate("cannot finalize package without CA certificates"));
        }

        let dir = self.package_dir(&package.id);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::certificate(format!("unable to create {}: {}", dir.display(), e)))?;

        package.cert_path = dir.join(CERT_FILE_NAME);
        package.key_path = dir.join(KEY_FILE_NAME);
        package.ca_path = dir.join(CA_CERT_FILE_NAME);

        fs::write(&package.cert_path, &package.certificate_pem)
            .map_err(|e| Error::certificate(format!("unable to write cert file: {}", e)))?;
        fs::write(&package.key_path, &package.private_key_pem)
            .map_err(|e| Error::certificate(format!("unable to write key file: {}", e)))?;
        restrict_key_mode(&package.key_path)?;
        fs::write(&package.ca_path, &package.ca_bundle_pem)
            .map_err(|e| Error::certificate(format!("unable to write ca file: {}", e)))?;

        // Load the key pair back from disk so the package serves exactly
        // what was persisted.
        let cert_pem = fs::read(&package.cert_path)
            .map_err(|e| Error::certificate(format!("could not load key pair: {}", e)))?;
        parse_x509_pem(&cert_pem)
            .map_err(|e| Error::certificate(format!("could not load key pair: {}", e)))?;
        package.certificate_pem = cert_pem;
        package.private_key_pem = fs::read(&package.key_path)
            .map_err(|e| Error::certificate(format!("could not load key pair: {}", e)))?;

        package.finalized = true;
        info!("finalized certificate package {}", package.id);

        let mut inner = self.inner.write().unwrap();
        inner.collection.insert(package.id.clone(), Arc::new(package));
        Ok(())
    }

    /// Activate a finalized package: mirror its files into
    /// `<root>/active/` and swap the active pointer. Fails without side
    /// effects for unknown or non-finalized IDs.
    pub fn activate(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        let package = inner
            .collection
            .get(id)
            .ok_or_else(|| Error::certificate("unable to activate non existing cert package"))?
            .clone();
        if !package.finalized {
            return Err(Error::certificate("unable to activate non finalized cert package"));
        }

        let active_dir = self.active_dir();
        fs::create_dir_all(&active_dir).map_err(|e| {
            Error::certificate(format!("unable to create {}: {}", active_dir.display(), e))
        })?;
        for (src, name) in [
            (&package.cert_path, CERT_FILE_NAME),
            (&package.key_path, KEY_FILE_NAME),
            (&package.ca_path, CA_CERT_FILE_NAME),
        ] {
            fs::copy(src, active_dir.join(name)).map_err(|e| {
                Error::certificate(format!("unable to mirror {}: {}", src.display(), e))
            })?;
        }

        inner.active = Some(id.to_string());
        info!("activated certificate package {}", id);
        Ok(())
    }

    /// Read the three package files from `<root>/<id>/` and insert the
    /// result as a finalized package.
    pub fn import_from_path(&self, id: &str) -> Result<()> {
        let dir = self.package_dir(id);
        let cert_path = dir.join(CERT_FILE_NAME);
        let key_path = dir.join(KEY_FILE_NAME);
        let ca_path = dir.join(CA_CERT_FILE_NAME);

        let cert_pem = fs::read(&cert_path).map_err(|e| {
            Error::certificate(format!("could not read certificate {}: {}", cert_path.display(), e))
        })?;
        let key_pem = fs::read(&key_path).map_err(|e| {
            Error::certificate(format!("could not read key {}: {}", key_path.display(), e))
        })?;
        let ca_pem = fs::read(&ca_path).map_err(|e| {
            Error::certificate(format!("could not read CA bundle {}: {}", ca_path.display(), e))
        })?;

        let key = parse_private_key(&key_pem)?;
        let mut package = Package {
            id: id.to_string(),
            cert_path,
            key_path,
            ca_path,
            private_key_pem: key_pem,
            private_key: Some(key),
            ..Default::default()
        };
        package.load_signed_certificate(&cert_pem)?;
        package.load_ca_certificates(&ca_pem)?;
        package.finalized = true;

        let mut inner = self.inner.write().unwrap();
        inner.collection.insert(id.to_string(), Arc::new(package));
        Ok(())
    }

    pub fn get_active_package(&self) -> Option<Arc<Package>> {
        let inner = self.inner.read().unwrap();
        inner.active.as_ref().and_then(|id| inner.collection.get(id)).cloned()
    }

    /// CertInfo list of the active package, as served by gNOI
    /// GetCertificates.
    pub fn active_cert_info(&self) -> Vec<CertificateInfo> {
        self.get_active_package()
            .map(|p| p.cert_info.clone())
            .unwrap_or_default()
    }

    /// File paths of the active package, used for the southbound dial.
    pub fn active_tls_paths(&self) -> Option<(PathBuf, PathBuf, PathBuf)> {
        self.get_active_package()
            .map(|p| (p.key_path.clone(), p.cert_path.clone(), p.ca_path.clone()))
    }
}

fn generate_private_key(size: usize) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::new(&mut OsRng, size)
        .map_err(|_| Error::certificate("failed to generate key"))?;
    let bits = key.n().bits();
    if bits != size {
        return Err(Error::certificate(format!("key too short ({} vs {})", bits, size)));
    }
    Ok(key)
}

fn parse_private_key(pem: &[u8]) -> Result<RsaPrivateKey> {
    let text = std::str::from_utf8(pem)
        .map_err(|e| Error::certificate(format!("failed to parse key: {}", e)))?;
    RsaPrivateKey::from_pkcs8_pem(text)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(text))
        .map_err(|e| Error::certificate(format!("failed to parse key: {}", e)))
}

#[cfg(unix)]
fn restrict_key_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o640))
        .map_err(|e| Error::certificate(format!("unable to set key mode: {}", e)))
}

#[cfg(not(unix))]
fn restrict_key_mode(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    fn self_signed(key: &RsaPrivateKey) -> Vec<u8> {
        let der = key.to_pkcs8_der().unwrap();
        let key_pair = rcgen::KeyPair::try_from(der.as_bytes()).unwrap();
        let params = rcgen::CertificateParams::new(vec!["target.gnxi.lan".to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        cert.pem().into_bytes()
    }

    fn finalized_package(id: &str) -> Package {
        let key = generate_private_key(2048).unwrap();
        let cert = self_signed(&key);
        let mut package = Package::in_construction(key).unwrap();
        package.id = id.to_string();
        package.load_signed_certificate(&cert).unwrap();
        package.load_ca_certificates(&cert).unwrap();
        package
    }

    #[test]
    fn test_activate_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new(dir.path());
        assert!(manager.activate("unknown-id").is_err());
        assert!(manager.get_active_package().is_none());
    }

    #[test]
    fn test_activate_without_finalize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new(dir.path());
        let key = generate_private_key(2048).unwrap();
        let mut package = Package::in_construction(key).unwrap();
        package.id = "pending".to_string();
        // The package never went through finalize, so the collection does
        // not know it.
        assert!(manager.activate("pending").is_err());
        assert!(manager.get_active_package().is_none());
    }

    #[test]
    fn test_finalize_then_activate_mirrors_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new(dir.path());

        let package = finalized_package("pkg-1");
        manager.finalize(package).unwrap();
        manager.activate("pkg-1").unwrap();

        for name in [CERT_FILE_NAME, KEY_FILE_NAME, CA_CERT_FILE_NAME] {
            let original = fs::read(dir.path().join("pkg-1").join(name)).unwrap();
            let mirrored = fs::read(dir.path().join(ACTIVE_DIR_NAME).join(name)).unwrap();
            assert_eq!(original, mirrored, "{} differs from active mirror", name);
        }

        let active = manager.get_active_package().unwrap();
        assert_eq!(active.id, "pkg-1");
        assert_eq!(active.cert_info.len(), 1);
    }

    #[test]
    fn test_import_from_path_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new(dir.path());

        let package = finalized_package("pkg-2");
        manager.finalize(package).unwrap();

        let fresh = Manager::new(dir.path());
        fresh.import_from_path("pkg-2").unwrap();
        fresh.activate("pkg-2").unwrap();
        let active = fresh.get_active_package().unwrap();
        assert!(active.finalized);
        assert!(!active.certificate_pem.is_empty());
    }

    #[test]
    fn test_finalize_requires_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new(dir.path());
        let key = generate_private_key(2048).unwrap();
        let mut package = Package::in_construction(key).unwrap();
        package.id = "incomplete".to_string();
        assert!(manager.finalize(package).is_err());
        assert!(manager.get_active_package().is_none());
    }

    #[test]
    fn test_activation_switch_over() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new(dir.path());

        manager.finalize(finalized_package("pkg-a")).unwrap();
        manager.finalize(finalized_package("pkg-b")).unwrap();

        manager.activate("pkg-a").unwrap();
        assert_eq!(manager.get_active_package().unwrap().id, "pkg-a");
        manager.activate("pkg-b").unwrap();
        assert_eq!(manager.get_active_package().unwrap().id, "pkg-b");

        // A failed activation leaves the pointer unchanged.
        assert!(manager.activate("unknown").is_err());
        assert_eq!(manager.get_active_package().unwrap().id, "pkg-b");
    }
}
