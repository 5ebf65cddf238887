//! Document rebuilding: assemble a fresh PDF from image pages or copied pages.
//!
//! Two kinds of page go into an [`OutputDocument`]:
//!
//! * **Image pages** (compress) — one full-page image XObject drawn on a
//!   page whose `MediaBox` is exactly the image size, 1 px = 1 unit.
//! * **Copied pages** (split, merge) — a deep copy of a source page and
//!   everything it references. Inheritable attributes are materialised on
//!   the copy and `/Parent` is never followed, so the copy never drags in
//!   the rest of the source page tree.
//!
//! Objects reachable from several copied pages (a shared font, a shared
//! resource dictionary) are copied once per source document: the copy map
//! is keyed by the source's identity.

use crate::error::{PageError, PdfPressError};
use crate::pipeline::decode::{inherited_attribute, PageHandle, SourceDocument};
use crate::pipeline::encode::EncodedPageImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use tracing::debug;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// US Letter, the default when no `MediaBox` is found anywhere.
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

const PRODUCER: &str = concat!("edgequake-pdfpress ", env!("CARGO_PKG_VERSION"));

/// Name of the page image in every image page's resources.
const PAGE_IMAGE_NAME: &str = "Im0";

/// A PDF under construction.
pub struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    /// Source identity → (source object id → output object id).
    copy_maps: HashMap<u64, HashMap<ObjectId, ObjectId>>,
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::create()
    }
}

impl OutputDocument {
    /// An empty document with a reserved page tree root.
    pub fn create() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            copy_maps: HashMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append a page showing `image` edge to edge.
    pub fn add_image_page(&mut self, image: EncodedPageImage) -> lopdf::Result<ObjectId> {
        let (width, height) = (image.width as i64, image.height as i64);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0.into(),
                        0.into(),
                        height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(PAGE_IMAGE_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content.encode()?;

        let xobject = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => image.filter.pdf_name(),
            },
            image.data,
        )
        .with_compression(false);
        let xobject_id = self.doc.add_object(xobject);
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content_bytes));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    PAGE_IMAGE_NAME => xobject_id,
                },
            },
        });
        self.kids.push(page_id);
        Ok(page_id)
    }

    /// Append a deep copy of `page`.
    ///
    /// On failure nothing is left behind in this document, so the caller
    /// may keep adding other pages.
    pub fn add_copied_page(&mut self, page: PageHandle<'_>) -> Result<ObjectId, PageError> {
        let source = page.source();
        let page_num = page.number();
        let copy_failed = |detail: String| PageError::CopyFailed {
            page: page_num,
            detail,
        };

        let src_dict = page
            .dictionary()
            .map_err(|e| copy_failed(format!("page object {:?}: {}", page.object_id(), e)))?;
        let page_dict = materialise_page(source, src_dict);

        let new_page_id = self.doc.new_object_id();
        let map = self.copy_maps.entry(source.id()).or_default();
        map.insert(page.object_id(), new_page_id);

        let mut copier = ObjectCopier {
            source: source.document(),
            target: &mut self.doc,
            id_map: map,
            added: vec![new_page_id],
        };

        match copier.remap_dictionary(page_dict) {
            Ok(mut dict) => {
                dict.set("Parent", self.pages_id);
                self.doc.objects.insert(new_page_id, Object::Dictionary(dict));
                self.kids.push(new_page_id);
                debug!(
                    "Copied page {} of '{}' → {:?}",
                    page_num,
                    source.name(),
                    new_page_id
                );
                Ok(new_page_id)
            }
            Err(missing) => {
                let added = std::mem::take(&mut copier.added);
                for id in added {
                    self.doc.objects.remove(&id);
                    map_remove_target(&mut self.copy_maps, source.id(), id);
                }
                Err(copy_failed(format!(
                    "dangling reference to object {} {} R",
                    missing.0, missing.1
                )))
            }
        }
    }

    /// Write the page tree, catalog and trailer, and serialise to bytes.
    pub fn serialize(mut self) -> Result<Vec<u8>, PdfPressError> {
        if self.kids.is_empty() {
            return Err(PdfPressError::Serialize(
                "document has no pages".to_string(),
            ));
        }

        let kids: Vec<Object> = self.kids.iter().map(|&id| Object::Reference(id)).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.kids.len() as i64,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Producer" => Object::string_literal(PRODUCER),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        self.doc
            .save_to(&mut bytes)
            .map_err(|e| PdfPressError::Serialize(e.to_string()))?;
        Ok(bytes)
    }
}

/// Copy of a page dictionary with inherited attributes made explicit and
/// `/Parent` dropped.
fn materialise_page(source: &SourceDocument, page: &Dictionary) -> Dictionary {
    let mut dict = page.clone();
    dict.remove(b"Parent");
    for key in INHERITABLE_KEYS {
        if dict.has(key) {
            continue;
        }
        if let Some(value) = inherited_attribute(source.document(), page, key) {
            dict.set(key.to_vec(), value);
        }
    }
    if !dict.has(b"MediaBox") {
        dict.set(
            "MediaBox",
            DEFAULT_MEDIA_BOX.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
        );
    }
    dict
}

fn map_remove_target(maps: &mut HashMap<u64, HashMap<ObjectId, ObjectId>>, source: u64, target: ObjectId) {
    if let Some(map) = maps.get_mut(&source) {
        map.retain(|_, v| *v != target);
    }
}

fn is_page_tree_node(obj: &Object) -> bool {
    let dict = match obj {
        Object::Dictionary(d) => d,
        _ => return false,
    };
    matches!(dict.get(b"Type"), Ok(Object::Name(n)) if n.as_slice() == b"Page" || n.as_slice() == b"Pages")
}

/// Deep-copies objects from one document into another, remapping references.
///
/// Every new id is recorded in the map *before* recursing into the object,
/// so reference cycles terminate.
struct ObjectCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    id_map: &'a mut HashMap<ObjectId, ObjectId>,
    /// Ids created by this copier, for rollback.
    added: Vec<ObjectId>,
}

impl ObjectCopier<'_> {
    /// Returns the dangling id on failure.
    fn copy_object(&mut self, source_id: ObjectId) -> Result<Object, ObjectId> {
        if let Some(&target_id) = self.id_map.get(&source_id) {
            return Ok(Object::Reference(target_id));
        }

        let obj = self.source.get_object(source_id).map_err(|_| source_id)?;
        // Links to other pages would pull in their whole page; drop them.
        if is_page_tree_node(obj) {
            return Ok(Object::Null);
        }
        let obj = obj.clone();

        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);
        self.added.push(new_id);

        let new_obj = self.remap(obj)?;
        self.target.objects.insert(new_id, new_obj);
        Ok(Object::Reference(new_id))
    }

    fn remap(&mut self, obj: Object) -> Result<Object, ObjectId> {
        match obj {
            Object::Reference(id) => self.copy_object(id),
            Object::Array(arr) => Ok(Object::Array(
                arr.into_iter()
                    .map(|o| self.remap(o))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.remap_dictionary(dict)?)),
            Object::Stream(mut stream) => {
                stream.dict = self.remap_dictionary(stream.dict)?;
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }

    fn remap_dictionary(&mut self, mut dict: Dictionary) -> Result<Dictionary, ObjectId> {
        for (_, value) in dict.iter_mut() {
            let original = std::mem::replace(value, Object::Null);
            *value = self.remap(original)?;
        }
        Ok(dict)
    }
}
