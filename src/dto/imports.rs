use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Column index (0-based) of each recognized product field in the uploaded
/// sheet. Inferred by `analyze`, confirmed (possibly edited) by the caller
/// for `validate` and `process`.
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct ColumnMapping {
    pub name: Option<usize>,
    pub sku: Option<usize>,
    pub stock: Option<usize>,
    pub min_stock: Option<usize>,
    pub cost_price: Option<usize>,
    pub sale_price: Option<usize>,
    pub category: Option<usize>,
    pub supplier: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub headers: Vec<String>,
    pub mapping: ColumnMapping,
    pub preview: Vec<Vec<String>>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RowIssueKind {
    Invalid,
    DuplicateInDb,
    DuplicateInList,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RowIssue {
    /// 0-based data row index (header row excluded).
    pub row: usize,
    pub kind: RowIssueKind,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationReport {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub issues: Vec<RowIssue>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessReport {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub issues: Vec<RowIssue>,
    pub created_ids: Vec<Uuid>,
}
