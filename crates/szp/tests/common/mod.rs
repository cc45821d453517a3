#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use szp::SigningCredentials;

/// Certificate and key PEM files for one generated identity.
pub struct Identity {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub cert_pem: String,
    pub key_pem: String,
}

impl Identity {
    pub fn generate(dir: &Path, common_name: &str) -> Self {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let mut params =
            rcgen::CertificateParams::new(vec![format!("{}.test", common_name)]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, common_name);
        let cert = params.self_signed(&key_pair).unwrap();

        let cert_pem = cert.pem();
        let key_pem = key_pair.serialize_pem();
        let cert_path = dir.join(format!("{}.pem", common_name));
        let key_path = dir.join(format!("{}.key", common_name));
        fs::write(&cert_path, &cert_pem).unwrap();
        fs::write(&key_path, &key_pem).unwrap();

        Self {
            cert: cert_path,
            key: key_path,
            cert_pem,
            key_pem,
        }
    }

    pub fn credentials(&self) -> SigningCredentials {
        SigningCredentials::from_pem(self.cert_pem.as_bytes(), self.key_pem.as_bytes()).unwrap()
    }

    pub fn signer(&self) -> szp::Szp {
        szp::Szp::new().certificate(&self.cert).private_key(&self.key)
    }

    pub fn verifier(&self) -> szp::Szp {
        szp::Szp::new().certificate(&self.cert)
    }
}

/// Writes `files` (path, contents) below `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    fs::create_dir_all(root).unwrap();
    for (path, contents) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}

/// Every file below `root` as (`/`-joined relative path, contents), sorted.
pub fn read_tree(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .map(Result::unwrap)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap();
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_str().unwrap())
                .collect::<Vec<_>>()
                .join("/");
            (name, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}
