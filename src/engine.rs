//! Binding to the pdfium shared library.
//!
//! Resolution order:
//!
//! 1. `PDFIUM_LIB_PATH`: a library file, or a directory containing one
//! 2. the platform library name in the working directory (`./libpdfium.so`)
//! 3. the system library search path
//!
//! pdfium keeps process-global state: creating a [`Pdfium`] initialises the
//! library and dropping one tears it down. Compress runs therefore share
//! the single instance from [`shared_pdfium`], which is bound on first use
//! and never dropped. Per-run documents are still opened and closed by each
//! run.

use crate::error::PdfPressError;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an existing pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

static SHARED: OnceCell<Pdfium> = OnceCell::new();

/// The process-wide pdfium instance, bound on first call.
///
/// A failed bind leaves nothing cached, so a later call retries.
pub fn shared_pdfium() -> Result<&'static Pdfium, PdfPressError> {
    SHARED.get_or_try_init(bind_pdfium)
}

/// Bind pdfium using the resolution order above.
///
/// Prefer [`shared_pdfium`]; dropping the returned instance tears down the
/// library for every other instance in the process.
pub fn bind_pdfium() -> Result<Pdfium, PdfPressError> {
    if let Some(path) = std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        let path = library_path(Path::new(&path));
        debug!("Binding pdfium from {}={}", PDFIUM_LIB_PATH_ENV, path.display());
        return bind_pdfium_from_path(&path);
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PdfPressError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Bind pdfium from an explicit library file.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfPressError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| {
            PdfPressError::PdfiumBindingFailed(format!("{}: {:?}", path.display(), e))
        })
}

/// `path` itself when it names a file, else the platform library inside it.
fn library_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_instance_can_cross_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pdfium>();
        assert_send_sync::<&'static Pdfium>();
    }

    #[test]
    fn directory_resolves_to_platform_library() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = library_path(dir.path());
        assert!(resolved.starts_with(dir.path()));
        assert_ne!(resolved, dir.path());
    }

    #[test]
    fn file_path_is_kept() {
        let p = Path::new("/opt/pdfium/lib/libpdfium.so");
        assert_eq!(library_path(p), p.to_path_buf());
    }

    #[test]
    fn missing_library_is_a_binding_error() {
        let err = bind_pdfium_from_path(Path::new("/nonexistent/libpdfium.so")).unwrap_err();
        assert!(matches!(err, PdfPressError::PdfiumBindingFailed(_)));
    }
}
