//! Upload token lifecycle: issue, rotate, print.
//!
//! A token is live only once it is in three places: the token file, the
//! overlay drop-in, and the environment of the restarted process. Rotation
//! writes both files, then reloads and restarts. If the supervisor refuses,
//! both files are put back so the file never disagrees with the process.

use crate::constants;
use crate::core::host::{Host, ProcessSupervisor};
use crate::core::paths::HostPaths;
use crate::core::store::ConfigStore;
use crate::core::unit_gen;
use crate::error::{ProvisionError, Result};
use crate::models::target::TargetDescriptor;
use crate::models::token::UploadToken;
use anyhow::Context;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

pub struct TokenManager<'a> {
    target: &'a TargetDescriptor,
    paths: &'a HostPaths,
    store: &'a dyn ConfigStore,
    supervisor: &'a dyn ProcessSupervisor,
}

/// Prior contents of one artifact, for restore on failure.
struct Saved {
    path: PathBuf,
    contents: Option<Zeroizing<String>>,
    mode: u32,
}

impl<'a> TokenManager<'a> {
    pub fn new(target: &'a TargetDescriptor, host: &'a Host) -> Self {
        Self {
            target,
            paths: &host.paths,
            store: host.store.as_ref(),
            supervisor: host.supervisor.as_ref(),
        }
    }

    /// The persisted token, or `TokenNotFound` if none was ever issued.
    pub fn print(&self) -> Result<UploadToken> {
        self.current()?
            .ok_or_else(|| ProvisionError::TokenNotFound(self.target.token_file.clone()))
    }

    /// The persisted token, if any. A malformed file is an error, not absence.
    pub fn current(&self) -> Result<Option<UploadToken>> {
        let path = &self.target.token_file;
        let Some(raw) = self.store.read(path)? else {
            return Ok(None);
        };
        UploadToken::parse(&raw)
            .map(Some)
            .map_err(|reason| ProvisionError::MalformedToken {
                path: path.clone(),
                reason,
            })
    }

    /// Replace the active token with a fresh one.
    pub fn rotate(&self) -> Result<UploadToken> {
        let token = UploadToken::generate();
        self.install(&token)?;
        tracing::info!(unit = %self.target.unit_name(), "upload token rotated");
        Ok(token)
    }

    /// Keep the persisted token if there is a valid one, else issue one.
    /// Either way the overlay is rewritten and the service restarted.
    ///
    /// Returns the token and whether it was newly issued.
    pub fn ensure(&self) -> Result<(UploadToken, bool)> {
        let (token, issued) = match self.current() {
            Ok(Some(token)) => (token, false),
            Ok(None) => (UploadToken::generate(), true),
            Err(ProvisionError::MalformedToken { path, reason }) => {
                tracing::warn!(path = %path.display(), %reason, "replacing malformed token file");
                (UploadToken::generate(), true)
            }
            Err(e) => return Err(e),
        };
        self.install(&token)?;
        Ok((token, issued))
    }

    fn install(&self, token: &UploadToken) -> Result<()> {
        let token_path = &self.target.token_file;
        let overlay_path = self.paths.overlay_file(self.target);

        if let Some(parent) = token_path.parent() {
            if !self.store.exists(parent) {
                self.store.ensure_dir(parent, constants::TOKEN_DIR_MODE)?;
            }
        }

        let saved = vec![
            self.save(token_path, constants::TOKEN_FILE_MODE)?,
            self.save(&overlay_path, constants::OVERLAY_FILE_MODE)?,
        ];

        let overlay = unit_gen::generate_overlay(token);
        let applied = self
            .store
            .replace(token_path, &token.file_contents(), constants::TOKEN_FILE_MODE)
            .and_then(|_| {
                self.store
                    .replace(&overlay_path, &overlay, constants::OVERLAY_FILE_MODE)
            })
            .and_then(|_| self.supervisor.daemon_reload())
            .and_then(|_| self.supervisor.restart(&self.target.unit_name()))
            .with_context(|| format!("activate new token for {}", self.target.unit_name()));

        if let Err(err) = applied {
            tracing::error!(error = %err, "token activation failed, restoring previous state");
            self.restore(&saved);
            return Err(err.into());
        }
        Ok(())
    }

    fn save(&self, path: &Path, mode: u32) -> Result<Saved> {
        Ok(Saved {
            path: path.to_path_buf(),
            contents: self.store.read(path)?,
            mode: self.store.mode(path)?.unwrap_or(mode),
        })
    }

    /// Best effort: the original error is what the caller needs to see.
    fn restore(&self, saved: &[Saved]) {
        for item in saved {
            let result = match &item.contents {
                Some(contents) => self.store.replace(&item.path, contents, item.mode),
                None => self.store.remove(&item.path).map(|_| ()),
            };
            if let Err(e) = result {
                tracing::error!(path = %item.path.display(), error = %e, "restore failed");
            }
        }
        if let Err(e) = self.supervisor.daemon_reload() {
            tracing::error!(error = %e, "daemon-reload after restore failed");
        }
    }
}
