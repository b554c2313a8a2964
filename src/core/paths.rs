//! Host artifact locations.

use crate::models::target::TargetDescriptor;
use crate::util::path as host_path;
use std::path::{Path, PathBuf};

/// Where each managed artifact lives on the host.
///
/// Paths are logical (as seen by systemd, nginx and certbot). With a staging
/// root, [`HostPaths::physical`] maps them below that root.
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub root: Option<PathBuf>,
    pub systemd_dir: PathBuf,
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    pub letsencrypt_live: PathBuf,
    pub letsencrypt_renewal: PathBuf,
    pub state_dir: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            root: None,
            systemd_dir: PathBuf::from("/etc/systemd/system"),
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            letsencrypt_live: PathBuf::from("/etc/letsencrypt/live"),
            letsencrypt_renewal: PathBuf::from("/etc/letsencrypt/renewal"),
            state_dir: PathBuf::from("/var/lib/filedrop-provision"),
        }
    }
}

impl HostPaths {
    pub fn with_root(root: Option<PathBuf>) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Map a logical path onto the filesystem actually touched.
    pub fn physical(&self, logical: &Path) -> PathBuf {
        match &self.root {
            Some(root) => host_path::rebase(root, logical),
            None => logical.to_path_buf(),
        }
    }

    pub fn unit_file(&self, target: &TargetDescriptor) -> PathBuf {
        self.systemd_dir.join(target.unit_name())
    }

    pub fn overlay_dir(&self, target: &TargetDescriptor) -> PathBuf {
        self.systemd_dir.join(format!("{}.d", target.unit_name()))
    }

    pub fn overlay_file(&self, target: &TargetDescriptor) -> PathBuf {
        self.overlay_dir(target).join("override.conf")
    }

    pub fn site_file(&self, target: &TargetDescriptor) -> PathBuf {
        self.sites_available.join(&target.service_name)
    }

    pub fn site_link(&self, target: &TargetDescriptor) -> PathBuf {
        self.sites_enabled.join(&target.service_name)
    }

    /// nginx's stock site, which would otherwise also claim port 80.
    pub fn default_site_link(&self) -> PathBuf {
        self.sites_enabled.join("default")
    }

    pub fn cert_dir(&self, domain: &str) -> PathBuf {
        self.letsencrypt_live.join(domain)
    }

    pub fn fullchain(&self, domain: &str) -> PathBuf {
        self.cert_dir(domain).join("fullchain.pem")
    }

    pub fn privkey(&self, domain: &str) -> PathBuf {
        self.cert_dir(domain).join("privkey.pem")
    }

    pub fn renewal_conf(&self, domain: &str) -> PathBuf {
        self.letsencrypt_renewal.join(format!("{}.conf", domain))
    }

    pub fn run_lock(&self) -> PathBuf {
        self.physical(&self.state_dir.join("run.lock"))
    }

    pub fn audit_log(&self) -> PathBuf {
        self.physical(&self.state_dir.join("audit.log"))
    }

    pub fn audit_lock(&self) -> PathBuf {
        self.physical(&self.state_dir.join("audit.lock"))
    }
}

impl std::fmt::Display for HostPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.root {
            Some(root) => write!(f, "host@{}", root.display()),
            None => write!(f, "host@/"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::TargetSection;

    fn target() -> TargetDescriptor {
        TargetDescriptor::resolve(Some("example.com"), None, &TargetSection::default()).unwrap()
    }

    #[test]
    fn test_artifact_locations() {
        let paths = HostPaths::default();
        let t = target();
        assert_eq!(
            paths.unit_file(&t),
            PathBuf::from("/etc/systemd/system/filedrop.service")
        );
        assert_eq!(
            paths.overlay_file(&t),
            PathBuf::from("/etc/systemd/system/filedrop.service.d/override.conf")
        );
        assert_eq!(
            paths.site_link(&t),
            PathBuf::from("/etc/nginx/sites-enabled/filedrop")
        );
        assert_eq!(
            paths.fullchain("example.com"),
            PathBuf::from("/etc/letsencrypt/live/example.com/fullchain.pem")
        );
        assert_eq!(
            paths.renewal_conf("example.com"),
            PathBuf::from("/etc/letsencrypt/renewal/example.com.conf")
        );
    }

    #[test]
    fn test_physical_with_root() {
        let paths = HostPaths::with_root(Some(PathBuf::from("/stage")));
        assert_eq!(
            paths.physical(Path::new("/etc/filedrop/upload_token")),
            PathBuf::from("/stage/etc/filedrop/upload_token")
        );
        assert_eq!(
            paths.run_lock(),
            PathBuf::from("/stage/var/lib/filedrop-provision/run.lock")
        );
    }

    #[test]
    fn test_physical_without_root_is_identity() {
        let paths = HostPaths::default();
        assert_eq!(
            paths.physical(Path::new("/etc/x")),
            PathBuf::from("/etc/x")
        );
    }
}
