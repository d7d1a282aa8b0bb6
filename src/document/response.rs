//! The wire shape of a Textract response.
//!
//! Textract's synchronous calls return their blocks directly, and the
//! asynchronous Get* calls return them a page of results at a time. Either
//! way, we reassemble them into this one serde model, which is what the CLI
//! writes as its output JSON. Field names follow the service's PascalCase
//! JSON, so output files parse anywhere the raw API response would.

use aws_sdk_textract::operation::{
    analyze_document::AnalyzeDocumentOutput,
    detect_document_text::DetectDocumentTextOutput,
};
use aws_sdk_textract::types as sdk;
use serde::{Deserialize, Serialize};

/// A complete Textract response: document metadata plus every block.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TextractResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_metadata: Option<DocumentMetadata>,

    pub blocks: Vec<Block>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detect_document_text_model_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyze_document_model_version: Option<String>,

    /// Final job status, for responses assembled from an asynchronous job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

/// Page count reported by the service.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<i32>,
}

/// One Textract block.
///
/// Block types, relationship types, entity types and selection statuses stay
/// as the service's strings rather than enums, so unrecognized values (new
/// LAYOUT_* types, say) survive a round trip instead of being flattened.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Block {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_index: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_span: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_span: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entity_types: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i32>,
}

impl Block {
    /// Iterate over the ids of related blocks with the given relationship
    /// type (`CHILD`, `VALUE`, ...).
    pub fn related_ids<'a>(
        &'a self,
        relationship_type: &'a str,
    ) -> impl Iterator<Item = &'a str> {
        self.relationships
            .iter()
            .filter(move |r| r.relationship_type == relationship_type)
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }
}

/// Where a block sits on the page.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Geometry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub polygon: Vec<Point>,
}

/// An axis-aligned bounding box, in page-relative coordinates.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BoundingBox {
    pub width: f32,
    pub height: f32,
    pub left: f32,
    pub top: f32,
}

/// A polygon vertex, in page-relative coordinates.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A typed link from one block to others.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub relationship_type: String,

    pub ids: Vec<String>,
}

impl From<&sdk::Block> for Block {
    fn from(block: &sdk::Block) -> Self {
        Self {
            id: block.id().map(str::to_owned),
            block_type: block.block_type().map(|t| t.as_str().to_owned()),
            text: block.text().map(str::to_owned),
            text_type: block.text_type().map(|t| t.as_str().to_owned()),
            confidence: block.confidence(),
            row_index: block.row_index(),
            column_index: block.column_index(),
            row_span: block.row_span(),
            column_span: block.column_span(),
            geometry: block.geometry().map(Geometry::from),
            relationships: block.relationships().iter().map(Relationship::from).collect(),
            entity_types: block
                .entity_types()
                .iter()
                .map(|t| t.as_str().to_owned())
                .collect(),
            selection_status: block.selection_status().map(|s| s.as_str().to_owned()),
            page: block.page(),
        }
    }
}

impl From<&sdk::Geometry> for Geometry {
    fn from(geometry: &sdk::Geometry) -> Self {
        Self {
            bounding_box: geometry.bounding_box().map(|b| BoundingBox {
                width: b.width(),
                height: b.height(),
                left: b.left(),
                top: b.top(),
            }),
            polygon: geometry
                .polygon()
                .iter()
                .map(|p| Point { x: p.x(), y: p.y() })
                .collect(),
        }
    }
}

impl From<&sdk::Relationship> for Relationship {
    fn from(relationship: &sdk::Relationship) -> Self {
        Self {
            relationship_type: relationship
                .r#type()
                .map(|t| t.as_str().to_owned())
                .unwrap_or_default(),
            ids: relationship.ids().to_vec(),
        }
    }
}

impl From<&sdk::DocumentMetadata> for DocumentMetadata {
    fn from(metadata: &sdk::DocumentMetadata) -> Self {
        Self {
            pages: metadata.pages(),
        }
    }
}

impl From<DetectDocumentTextOutput> for TextractResponse {
    fn from(output: DetectDocumentTextOutput) -> Self {
        Self {
            document_metadata: output.document_metadata().map(DocumentMetadata::from),
            detect_document_text_model_version: output
                .detect_document_text_model_version()
                .map(str::to_owned),
            blocks: output.blocks().iter().map(Block::from).collect(),
            ..Self::default()
        }
    }
}

impl From<AnalyzeDocumentOutput> for TextractResponse {
    fn from(output: AnalyzeDocumentOutput) -> Self {
        Self {
            document_metadata: output.document_metadata().map(DocumentMetadata::from),
            analyze_document_model_version: output
                .analyze_document_model_version()
                .map(str::to_owned),
            blocks: output.blocks().iter().map(Block::from).collect(),
            ..Self::default()
        }
    }
}
