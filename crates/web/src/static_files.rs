//! Static asset serving from sandboxed directories.
//!
//! A request path is mapped to a file below a configured root. The mapped path
//! is normalized (`.`/`..` resolved) and only then checked against the root,
//! so traversal sequences cannot escape it. Symlinks are resolved as well and
//! re-checked before any byte is read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use path_absolutize::Absolutize;
use thiserror::Error;

use wardgate_core::{SecurityConfig, StaticMount};

use crate::errors::plain_error;

/// Why a static request could not be served.
#[derive(Debug, Error)]
pub enum StaticError {
    #[error("request path does not start with the static prefix")]
    PrefixMismatch,

    #[error("request path escapes the static root")]
    Traversal,

    #[error("static file not found")]
    NotFound,

    #[error("failed to read static file: {0}")]
    Read(#[from] std::io::Error),
}

impl StaticError {
    pub fn status(&self) -> StatusCode {
        match self {
            StaticError::PrefixMismatch | StaticError::Traversal => StatusCode::FORBIDDEN,
            StaticError::NotFound => StatusCode::NOT_FOUND,
            StaticError::Read(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StaticError {
    fn into_response(self) -> Response {
        let body = match self.status() {
            StatusCode::FORBIDDEN => "403 Forbidden",
            StatusCode::NOT_FOUND => "404 Not Found",
            _ => "500 Internal Server Error",
        };
        plain_error(self.status(), body)
    }
}

/// A loaded asset, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAsset {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl IntoResponse for StaticAsset {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], self.bytes).into_response()
    }
}

/// One URL prefix bound to one directory.
#[derive(Debug, Clone)]
pub struct StaticRoot {
    name: String,
    url_prefix: String,
    root: PathBuf,
}

impl StaticRoot {
    /// Bind `url_prefix` to `dir`. The directory is made absolute (and
    /// canonical when it exists) here; it may appear later, in which case the
    /// symlink check canonicalizes it per request.
    pub fn new(
        name: impl Into<String>,
        url_prefix: impl Into<String>,
        dir: impl AsRef<Path>,
    ) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        let root = match std::fs::canonicalize(dir) {
            Ok(root) => root,
            Err(_) => dir.absolutize()?.into_owned(),
        };

        let mut url_prefix = url_prefix.into();
        while url_prefix.len() > 1 && url_prefix.ends_with('/') {
            url_prefix.pop();
        }

        Ok(Self {
            name: name.into(),
            url_prefix,
            root,
        })
    }

    pub fn from_mount(mount: &StaticMount) -> std::io::Result<Self> {
        Self::new(mount.name.clone(), mount.url_prefix.clone(), &mount.dir)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `request_path` falls under this root's prefix, on a segment
    /// boundary (`/static` matches `/static/a.css` but not `/statics/a.css`).
    pub fn matches(&self, request_path: &str) -> bool {
        if self.url_prefix == "/" {
            return request_path.starts_with('/');
        }
        match request_path.strip_prefix(self.url_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Map a request path to an absolute file path below the root.
    ///
    /// Pure computation; touches no file.
    pub fn resolve_path(&self, request_path: &str) -> Result<PathBuf, StaticError> {
        if !self.matches(request_path) {
            return Err(StaticError::PrefixMismatch);
        }
        let rest = request_path
            .strip_prefix(self.url_prefix.as_str())
            .ok_or(StaticError::PrefixMismatch)?;
        let decoded = urlencoding::decode(rest).map_err(|_| StaticError::NotFound)?;
        if decoded.contains('\0') {
            return Err(StaticError::NotFound);
        }
        let relative = decoded.trim_start_matches(['/', '\\']);

        let joined = self.root.join(relative);
        let normalized = joined
            .absolutize()
            .map_err(|_| StaticError::Traversal)?
            .into_owned();

        if !normalized.starts_with(&self.root) {
            return Err(StaticError::Traversal);
        }
        Ok(normalized)
    }

    /// Resolve and read the asset for `request_path`.
    pub async fn load(&self, request_path: &str) -> Result<StaticAsset, StaticError> {
        let path = self.resolve_path(request_path)?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| StaticError::NotFound)?;
        if !metadata.is_file() {
            return Err(StaticError::NotFound);
        }

        // A symlink inside the root may point anywhere; check where it lands.
        // The root is resolved the same way, since symlinks above it are fine.
        let real = tokio::fs::canonicalize(&path)
            .await
            .map_err(|_| StaticError::NotFound)?;
        let real_root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|_| StaticError::NotFound)?;
        if !real.starts_with(&real_root) {
            return Err(StaticError::Traversal);
        }

        let bytes = tokio::fs::read(&real).await?;
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();

        Ok(StaticAsset {
            content_type,
            bytes,
        })
    }

    /// Serve `request_path`, mapping every failure to its status code.
    pub async fn serve(&self, request_path: &str) -> Response {
        match self.load(request_path).await {
            Ok(asset) => asset.into_response(),
            Err(err) => {
                match &err {
                    StaticError::Traversal => {
                        tracing::warn!(root = %self.name, path = request_path, "static path traversal rejected");
                    }
                    StaticError::Read(io) => {
                        tracing::error!(root = %self.name, path = request_path, error = %io, "static file read failed");
                    }
                    _ => {
                        tracing::debug!(root = %self.name, path = request_path, reason = %err, "static request not served");
                    }
                }
                err.into_response()
            }
        }
    }
}

/// Serve `request_path` from `root_dir` mounted at `url_prefix`.
pub async fn resolve(request_path: &str, url_prefix: &str, root_dir: impl AsRef<Path>) -> Response {
    match StaticRoot::new("static", url_prefix, root_dir) {
        Ok(root) => root.serve(request_path).await,
        Err(err) => {
            tracing::error!(error = %err, "static root could not be made absolute");
            StaticError::Read(err).into_response()
        }
    }
}

/// Ordered set of static roots: named mounts (most specific first), then the
/// global root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    roots: Vec<StaticRoot>,
}

impl StaticFiles {
    pub fn new(roots: Vec<StaticRoot>) -> Self {
        Self { roots }
    }

    pub fn from_config(config: &SecurityConfig) -> std::io::Result<Self> {
        let mut roots = config
            .static_mounts()
            .iter()
            .map(StaticRoot::from_mount)
            .collect::<std::io::Result<Vec<_>>>()?;
        roots.push(StaticRoot::from_mount(config.static_root())?);
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[StaticRoot] {
        &self.roots
    }

    /// The first root whose prefix matches `request_path`.
    pub fn find(&self, request_path: &str) -> Option<&StaticRoot> {
        self.roots.iter().find(|root| root.matches(request_path))
    }
}

/// Short-circuit requests under a static prefix; pass everything else on.
pub async fn static_files_middleware(
    State(statics): State<Arc<StaticFiles>>,
    req: Request,
    next: Next,
) -> Response {
    match statics.find(req.uri().path()) {
        Some(root) => root.serve(req.uri().path()).await,
        None => next.run(req).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, StaticRoot) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("static/css")).unwrap();
        fs::write(dir.path().join("static/css/a.css"), "body{}").unwrap();
        fs::write(dir.path().join("static/blob.unknownext"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join("secret.txt"), "top secret").unwrap();

        let root = StaticRoot::new("static", "/static", dir.path().join("static")).unwrap();
        (dir, root)
    }

    #[test]
    fn resolve_path_stays_inside_root() {
        let (_dir, root) = fixture();
        let path = root.resolve_path("/static/css/a.css").unwrap();
        assert!(path.starts_with(root.root()));
        assert!(path.ends_with("css/a.css"));
    }

    #[test]
    fn dot_segments_inside_root_are_allowed() {
        let (_dir, root) = fixture();
        let path = root.resolve_path("/static/css/../css/./a.css").unwrap();
        assert!(path.ends_with("css/a.css"));
    }

    #[test]
    fn traversal_is_rejected_after_normalization() {
        let (_dir, root) = fixture();
        assert!(matches!(
            root.resolve_path("/static/../secret.txt"),
            Err(StaticError::Traversal)
        ));
        assert!(matches!(
            root.resolve_path("/static/css/../../../../etc/passwd"),
            Err(StaticError::Traversal)
        ));
    }

    #[test]
    fn encoded_traversal_is_rejected() {
        let (_dir, root) = fixture();
        assert!(matches!(
            root.resolve_path("/static/%2e%2e/secret.txt"),
            Err(StaticError::Traversal)
        ));
    }

    #[test]
    fn sibling_directory_with_common_prefix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("static")).unwrap();
        fs::create_dir_all(dir.path().join("static-private")).unwrap();
        let root = StaticRoot::new("static", "/static", dir.path().join("static")).unwrap();

        assert!(matches!(
            root.resolve_path("/static/../static-private/key.pem"),
            Err(StaticError::Traversal)
        ));
    }

    #[test]
    fn prefix_mismatch_is_forbidden() {
        let (_dir, root) = fixture();
        let err = root.resolve_path("/assets/a.css").unwrap_err();
        assert!(matches!(err, StaticError::PrefixMismatch));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn load_reads_bytes_and_guesses_type() {
        let (_dir, root) = fixture();
        let asset = root.load("/static/css/a.css").await.unwrap();
        assert_eq!(asset.content_type, "text/css");
        assert_eq!(asset.bytes, b"body{}");
    }

    #[tokio::test]
    async fn unknown_extension_is_octet_stream() {
        let (_dir, root) = fixture();
        let asset = root.load("/static/blob.unknownext").await.unwrap();
        assert_eq!(asset.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_file_and_directory_are_not_found() {
        let (_dir, root) = fixture();
        assert!(matches!(root.load("/static/nope.css").await, Err(StaticError::NotFound)));
        assert!(matches!(root.load("/static/css").await, Err(StaticError::NotFound)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_out_of_root_is_rejected() {
        let (dir, root) = fixture();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), dir.path().join("static/leak.txt")).unwrap();

        assert!(matches!(root.load("/static/leak.txt").await, Err(StaticError::Traversal)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn root_created_after_startup_below_a_symlink_is_served() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let config = SecurityConfig::new("k")
            .unwrap()
            .with_static_root("/static", dir.path().join("link/static"))
            .unwrap();
        let statics = StaticFiles::from_config(&config).unwrap();

        fs::create_dir_all(dir.path().join("real/static")).unwrap();
        fs::write(dir.path().join("real/static/a.css"), "body{}").unwrap();

        let root = statics.find("/static/a.css").unwrap();
        let res = root.serve("/static/a.css").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_file_is_a_server_error() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, _root) = fixture();
        let locked = dir.path().join("static/locked.css");
        fs::write(&locked, "body{}").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through the mode bits; nothing to observe then.
        if fs::read(&locked).is_ok() {
            return;
        }

        let res = resolve("/static/locked.css", "/static", dir.path().join("static")).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"500 Internal Server Error");

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn resolve_path_requires_a_segment_boundary() {
        let (dir, root) = fixture();
        fs::create_dir_all(dir.path().join("static/x")).unwrap();
        fs::write(dir.path().join("static/x/a.css"), "body{}").unwrap();

        assert!(matches!(
            root.resolve_path("/staticx/a.css"),
            Err(StaticError::PrefixMismatch)
        ));
    }

    #[tokio::test]
    async fn resolve_rejects_prefix_without_segment_boundary() {
        let (dir, _root) = fixture();
        fs::create_dir_all(dir.path().join("static/x")).unwrap();
        fs::write(dir.path().join("static/x/a.css"), "body{}").unwrap();

        let res = resolve("/staticx/a.css", "/static", dir.path().join("static")).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = resolve("/static/x/a.css", "/static/", dir.path().join("static")).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn resolve_maps_errors_to_statuses() {
        let (dir, _root) = fixture();
        let static_dir = dir.path().join("static");

        assert_eq!(resolve("/static/css/a.css", "/static", &static_dir).await.status(), StatusCode::OK);
        assert_eq!(
            resolve("/static/../../etc/passwd", "/static", &static_dir).await.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(resolve("/other/a.css", "/static", &static_dir).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(resolve("/static/none.js", "/static", &static_dir).await.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn prefix_matching_respects_segments() {
        let (_dir, root) = fixture();
        assert!(root.matches("/static/a.css"));
        assert!(root.matches("/static"));
        assert!(!root.matches("/statics/a.css"));
        assert!(!root.matches("/api/static/a.css"));
    }

    #[test]
    fn mounts_are_checked_before_global_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = SecurityConfig::new("k")
            .unwrap()
            .with_static_root("/static", dir.path().join("global"))
            .unwrap()
            .with_static_mount(StaticMount::new("blog", "/static/blog", dir.path().join("blog")).unwrap());

        let statics = StaticFiles::from_config(&config).unwrap();
        assert_eq!(statics.find("/static/blog/x.css").map(StaticRoot::name), Some("blog"));
        assert_eq!(statics.find("/static/x.css").map(StaticRoot::name), Some("static"));
        assert!(statics.find("/api/items").is_none());
    }
}
