//! Document decoding: PDF bytes → [`SourceDocument`] via lopdf.
//!
//! The decoded structure serves the copy path (split, merge) directly. The
//! raster path hands [`SourceDocument::render_bytes`] to pdfium, which is
//! the original buffer unless the input had to be decrypted, in which case
//! it is the decrypted re-serialisation. Decoding once up front means an
//! unreadable input fails before any page work starts.
//!
//! Encrypted inputs get best-effort handling: the configured password, or
//! the empty user password when none is given. Many "protected" PDFs only
//! carry an owner password and open fine this way. Only a failed password
//! check is reported as [`PdfPressError::PasswordRequired`]; an encryption
//! scheme lopdf cannot handle is a decode error.

use crate::error::PdfPressError;
use crate::output::DocumentMetadata;
use lopdf::encryption::{self, DecryptionError};
use lopdf::{Dictionary, Document, Object, ObjectId};
use once_cell::unsync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Where to look for the `%PDF-` header. Readers tolerate leading junk up
/// to this offset.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Check that `bytes` carries a PDF header near the start.
pub fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), PdfPressError> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        return Ok(());
    }
    Err(PdfPressError::NotAPdf {
        name: name.to_string(),
        magic: bytes.iter().take(4).copied().collect(),
    })
}

/// An opened, immutable input document.
pub struct SourceDocument {
    id: u64,
    name: String,
    byte_len: usize,
    encrypted: bool,
    document: Document,
    render_bytes: Vec<u8>,
    page_ids: OnceCell<Vec<ObjectId>>,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("name", &self.name)
            .field("byte_len", &self.byte_len)
            .field("encrypted", &self.encrypted)
            .finish_non_exhaustive()
    }
}

impl SourceDocument {
    /// Decode `bytes` into a document.
    ///
    /// # Errors
    /// * [`PdfPressError::NotAPdf`] — no PDF header
    /// * [`PdfPressError::Decode`] — unparseable, no pages, or an
    ///   unsupported encryption scheme
    /// * [`PdfPressError::PasswordRequired`] — encrypted and the password
    ///   (or the empty password) does not verify
    pub fn open(
        name: impl Into<String>,
        bytes: Vec<u8>,
        password: Option<&str>,
    ) -> Result<Self, PdfPressError> {
        let name = name.into();
        check_pdf_magic(&name, &bytes)?;
        let byte_len = bytes.len();

        let mut document = Document::load_mem(&bytes).map_err(|e| PdfPressError::Decode {
            name: name.clone(),
            detail: e.to_string(),
        })?;

        let encrypted = document.is_encrypted();
        let render_bytes = if encrypted {
            decrypt(&mut document, &name, password.unwrap_or(""))?;
            debug!(name = %name, "Decrypted PDF");

            let mut decrypted = Vec::new();
            document
                .save_to(&mut decrypted)
                .map_err(|e| PdfPressError::Decode {
                    name: name.clone(),
                    detail: format!("failed to re-serialise decrypted PDF: {e}"),
                })?;
            decrypted
        } else {
            bytes
        };

        let source = Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            byte_len,
            name,
            encrypted,
            document,
            render_bytes,
            page_ids: OnceCell::new(),
        };

        if source.page_count() == 0 {
            return Err(PdfPressError::Decode {
                name: source.name,
                detail: "document has no pages".into(),
            });
        }

        info!(
            name = %source.name,
            pages = source.page_count(),
            encrypted,
            "PDF decoded"
        );
        Ok(source)
    }

    /// Process-unique identity, used to share copied objects per source.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of the buffer the rasteriser will read.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Bytes suitable for a renderer: decrypted when the input was encrypted.
    pub fn render_bytes(&self) -> &[u8] {
        &self.render_bytes
    }

    pub(crate) fn document(&self) -> &Document {
        &self.document
    }

    fn page_ids(&self) -> &[ObjectId] {
        self.page_ids
            .get_or_init(|| self.document.get_pages().into_values().collect())
    }

    /// Number of pages; discovered on first use and cached.
    pub fn page_count(&self) -> usize {
        self.page_ids().len()
    }

    /// Handle to the page at zero-based `index`.
    pub fn page(&self, index: usize) -> Result<PageHandle<'_>, PdfPressError> {
        let ids = self.page_ids();
        ids.get(index)
            .map(|&object_id| PageHandle {
                source: self,
                index,
                object_id,
            })
            .ok_or(PdfPressError::PageOutOfRange {
                index,
                total: ids.len(),
            })
    }

    /// All pages in document order.
    pub fn pages(&self) -> impl Iterator<Item = PageHandle<'_>> + '_ {
        self.page_ids()
            .iter()
            .enumerate()
            .map(move |(index, &object_id)| PageHandle {
                source: self,
                index,
                object_id,
            })
    }

    /// Read the `/Info` dictionary and basic document facts.
    pub fn metadata(&self) -> DocumentMetadata {
        let info = self
            .document
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|o| match o {
                Object::Reference(id) => self.document.get_dictionary(*id).ok(),
                Object::Dictionary(d) => Some(d),
                _ => None,
            });

        let get_meta = |key: &[u8]| -> Option<String> {
            let value = info?.get(key).ok()?;
            let value = match value {
                Object::Reference(id) => self.document.get_object(*id).ok()?,
                other => other,
            };
            let s = lopdf::decode_text_string(value).ok()?;
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };

        DocumentMetadata {
            name: self.name.clone(),
            title: get_meta(b"Title"),
            author: get_meta(b"Author"),
            subject: get_meta(b"Subject"),
            creator: get_meta(b"Creator"),
            producer: get_meta(b"Producer"),
            creation_date: get_meta(b"CreationDate"),
            modification_date: get_meta(b"ModDate"),
            page_count: self.page_count(),
            pdf_version: self.document.version.clone(),
            is_encrypted: self.encrypted,
            byte_len: self.byte_len,
        }
    }
}

/// One page of a [`SourceDocument`]; cannot outlive it.
#[derive(Debug, Clone, Copy)]
pub struct PageHandle<'a> {
    source: &'a SourceDocument,
    index: usize,
    object_id: ObjectId,
}

impl<'a> PageHandle<'a> {
    pub fn source(&self) -> &'a SourceDocument {
        self.source
    }

    /// Zero-based index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// One-based page number.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub(crate) fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// The page dictionary, if the page object is well-formed.
    pub(crate) fn dictionary(&self) -> Result<&'a Dictionary, lopdf::Error> {
        self.source.document.get_dictionary(self.object_id)
    }

    /// Page size in points from the (possibly inherited) `/MediaBox`.
    pub(crate) fn size_points(&self) -> Option<(f32, f32)> {
        let dict = self.dictionary().ok()?;
        let media_box = inherited_attribute(&self.source.document, dict, b"MediaBox")?;
        let media_box = match media_box {
            Object::Reference(id) => self.source.document.get_object(id).ok()?.clone(),
            other => other,
        };
        let values: Vec<f32> = media_box
            .as_array()
            .ok()?
            .iter()
            .filter_map(number)
            .collect();
        match values.as_slice() {
            [x0, y0, x1, y1] => Some(((x1 - x0).abs(), (y1 - y0).abs())),
            _ => None,
        }
    }
}

/// Look up `key` on a page, walking up the page tree for inheritable attributes.
pub(crate) fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    if let Ok(value) = page.get(key) {
        return Some(value.clone());
    }
    let mut parent = page.get(b"Parent").and_then(|p| p.as_reference()).ok();
    // Page trees are shallow; the bound only guards against /Parent cycles.
    for _ in 0..64 {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decrypt `document` in place with `password` and drop its `/Encrypt`.
///
/// Documents with crypt filters (`/V 4`) go through lopdf's own
/// `decrypt`. The older RC4 schemes (`/V 1`, `/V 2`) carry no `/CF`
/// dictionary, which lopdf's `decrypt` insists on, so they are decrypted
/// here with lopdf's key derivation and per-object cipher.
fn decrypt(document: &mut Document, name: &str, password: &str) -> Result<(), PdfPressError> {
    let decode_error = |detail: String| PdfPressError::Decode {
        name: name.to_string(),
        detail,
    };

    let key = match encryption::get_encryption_key(document, password, true) {
        Ok(key) => key,
        Err(DecryptionError::IncorrectPassword) => {
            return Err(PdfPressError::PasswordRequired {
                name: name.to_string(),
            })
        }
        Err(e) => return Err(decode_error(format!("cannot decrypt: {e}"))),
    };

    let (has_crypt_filters, metadata_encrypted) = match document.get_encrypted() {
        Ok(dict) => (
            dict.has(b"CF"),
            dict.get(b"EncryptMetadata")
                .and_then(Object::as_bool)
                .unwrap_or(true),
        ),
        Err(e) => return Err(decode_error(format!("cannot decrypt: {e}"))),
    };

    if has_crypt_filters {
        document
            .decrypt(password)
            .map_err(|e| decode_error(format!("cannot decrypt: {e}")))?;
    } else {
        let encrypt_id = document
            .trailer
            .get(b"Encrypt")
            .and_then(Object::as_reference)
            .ok();
        for (&id, object) in document.objects.iter_mut() {
            if Some(id) == encrypt_id {
                continue;
            }
            match object.type_name().ok() {
                Some(b"XRef") => continue,
                Some(b"Metadata") if !metadata_encrypted => continue,
                _ => {}
            }
            decrypt_rc4(&key, id, object)
                .map_err(|e| decode_error(format!("object {} {} R: {e}", id.0, id.1)))?;
        }
        if let Some(id) = encrypt_id {
            document.objects.remove(&id);
        }
    }

    document.trailer.remove(b"Encrypt");
    Ok(())
}

/// RC4-decrypt every string and stream inside object `id`.
fn decrypt_rc4(key: &[u8], id: ObjectId, object: &mut Object) -> Result<(), DecryptionError> {
    match object {
        Object::Array(items) => {
            for item in items {
                decrypt_rc4(key, id, item)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                decrypt_rc4(key, id, value)?;
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                decrypt_rc4(key, id, value)?;
            }
        }
        _ => {}
    }

    match encryption::decrypt_object(key, id, &*object, false) {
        Ok(plain) => match object {
            Object::Stream(stream) => stream.set_content(plain),
            Object::String(content, _) => *content = plain,
            _ => {}
        },
        Err(DecryptionError::NotDecryptable) => {}
        Err(e) => return Err(e),
    }
    Ok(())
}
