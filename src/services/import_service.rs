use std::collections::HashSet;
use std::io::Cursor;

use calamine::{Reader, Xls, Xlsx};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QuerySelect, Set};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::imports::{
        AnalyzeResponse, ColumnMapping, ProcessReport, RowIssue, RowIssueKind, ValidationReport,
    },
    entity::products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::product_service::{STATE_ACTIVE, STATE_OUT_OF_STOCK},
    state::AppState,
    text::normalize,
};

const PREVIEW_ROWS: usize = 10;

/// A spreadsheet reduced to strings; cell typing happens during validation.
#[derive(Debug)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One uploaded row projected through a column mapping.
#[derive(Debug, Clone, Default)]
pub struct ImportRow {
    pub name: String,
    pub sku: Option<String>,
    pub stock: Option<String>,
    pub min_stock: Option<String>,
    pub cost_price: Option<String>,
    pub sale_price: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
}

#[derive(Debug)]
struct ValidRow {
    index: usize,
    name: String,
    sku: Option<String>,
    stock: i32,
    min_stock: i32,
    cost_price: i64,
    sale_price: i64,
    category: Option<String>,
    supplier: Option<String>,
}

enum RowOutcome {
    Ok(ValidRow),
    Issue(RowIssue),
}

pub async fn analyze(
    state: &AppState,
    user: &AuthUser,
    filename: &str,
    bytes: &[u8],
) -> AppResult<ApiResponse<AnalyzeResponse>> {
    let sheet = parse_sheet(filename, bytes)?;
    let mapping = infer_mapping(&sheet.headers);
    let preview = sheet.rows.iter().take(PREVIEW_ROWS).cloned().collect();

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "import_analyze",
        Some("products"),
        Some(serde_json::json!({ "file": filename, "rows": sheet.rows.len() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Import analyzed",
        AnalyzeResponse {
            headers: sheet.headers,
            mapping,
            preview,
            total_rows: sheet.rows.len(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn validate(
    state: &AppState,
    user: &AuthUser,
    filename: &str,
    bytes: &[u8],
    mapping: ColumnMapping,
) -> AppResult<ApiResponse<ValidationReport>> {
    let sheet = parse_sheet(filename, bytes)?;
    let rows = project_rows(&sheet, &mapping)?;
    let existing = existing_normalized_names(state, user).await?;
    let (report, _valid) = validate_rows(&rows, &existing);

    Ok(ApiResponse::success("Import validated", report, Some(Meta::empty())))
}

pub async fn process(
    state: &AppState,
    user: &AuthUser,
    filename: &str,
    bytes: &[u8],
    mapping: ColumnMapping,
) -> AppResult<ApiResponse<ProcessReport>> {
    let sheet = parse_sheet(filename, bytes)?;
    let rows = project_rows(&sheet, &mapping)?;
    let existing = existing_normalized_names(state, user).await?;
    let (mut report, valid) = validate_rows(&rows, &existing);

    // Each insert stands alone: a failure marks that row and moves on, rows
    // already inserted stay inserted.
    let mut created_ids = Vec::new();
    for row in valid {
        let product_state = if row.stock == 0 {
            STATE_OUT_OF_STOCK
        } else {
            STATE_ACTIVE
        };
        let insert = ProductActive {
            id: Set(Uuid::new_v4()),
            business_id: Set(user.business_id),
            name: Set(row.name.clone()),
            sku: Set(row.sku.clone()),
            stock: Set(row.stock),
            min_stock: Set(row.min_stock),
            reserved_stock: Set(0),
            cost_price: Set(row.cost_price),
            sale_price: Set(row.sale_price),
            state: Set(product_state.into()),
            category: Set(row.category.clone()),
            supplier: Set(row.supplier.clone()),
            deleted_at: Set(None),
            created_at: NotSet,
            updated_at: NotSet,
        };
        match Products::insert(insert).exec(&state.orm).await {
            Ok(result) => created_ids.push(result.last_insert_id),
            Err(err) => {
                tracing::warn!(row = row.index, error = %err, "import row insert failed");
                report.success -= 1;
                report.failed += 1;
                report.issues.push(RowIssue {
                    row: row.index,
                    kind: RowIssueKind::Invalid,
                    message: "insert failed".into(),
                });
            }
        }
    }

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "import_process",
        Some("products"),
        Some(serde_json::json!({
            "created": created_ids.len(),
            "failed": report.failed,
            "skipped": report.skipped,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let data = ProcessReport {
        success: report.success,
        failed: report.failed,
        skipped: report.skipped,
        issues: report.issues,
        created_ids,
    };
    Ok(ApiResponse::success("Import processed", data, Some(Meta::empty())))
}

/// Parse CSV or XLS/XLSX by extension into headers + string rows.
pub fn parse_sheet(filename: &str, bytes: &[u8]) -> AppResult<Sheet> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".csv") {
        parse_csv(bytes)
    } else if lower.ends_with(".xlsx") {
        let workbook = Xlsx::new(Cursor::new(bytes.to_vec()))
            .map_err(|err| AppError::Validation(format!("unreadable XLSX file: {err}")))?;
        parse_workbook(workbook)
    } else if lower.ends_with(".xls") {
        let workbook = Xls::new(Cursor::new(bytes.to_vec()))
            .map_err(|err| AppError::Validation(format!("unreadable XLS file: {err}")))?;
        parse_workbook(workbook)
    } else {
        Err(AppError::Validation(
            "unsupported file type, expected .csv, .xls or .xlsx".into(),
        ))
    }
}

fn parse_csv(bytes: &[u8]) -> AppResult<Sheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|err| AppError::Validation(format!("malformed CSV header: {err}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|err| AppError::Validation(format!("malformed CSV row: {err}")))?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(Sheet { headers, rows })
}

fn parse_workbook<R>(mut workbook: R) -> AppResult<Sheet>
where
    R: Reader<Cursor<Vec<u8>>>,
{
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Validation("workbook has no sheets".into()))?
        .map_err(|err| AppError::Validation(format!("unreadable worksheet: {err:?}")))?;

    let mut iter = range.rows();
    let headers = match iter.next() {
        Some(row) => row.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Err(AppError::Validation("worksheet is empty".into())),
    };
    let rows = iter
        .map(|row| row.iter().map(|c| c.to_string().trim().to_string()).collect())
        .collect();

    Ok(Sheet { headers, rows })
}

// Header synonyms per product field, Spanish and English, compared on
// normalized text.
const NAME_HEADERS: &[&str] = &["name", "nombre", "producto", "product", "descripcion", "description"];
const SKU_HEADERS: &[&str] = &["sku", "codigo", "code", "codigo de barras", "barcode", "ean"];
const STOCK_HEADERS: &[&str] = &["stock", "cantidad", "quantity", "existencias", "qty"];
const MIN_STOCK_HEADERS: &[&str] = &["min stock", "stock minimo", "minimo"];
const COST_HEADERS: &[&str] = &["cost", "costo", "precio costo", "precio de costo", "cost price"];
const PRICE_HEADERS: &[&str] = &["price", "precio", "precio venta", "precio de venta", "sale price", "pvp"];
const CATEGORY_HEADERS: &[&str] = &["category", "categoria", "rubro"];
const SUPPLIER_HEADERS: &[&str] = &["supplier", "proveedor", "vendor"];

/// Infer the column mapping by similarity between normalized headers and the
/// per-field synonym lists. Exact matches win; a containment match is good
/// enough otherwise. First match per field wins.
pub fn infer_mapping(headers: &[String]) -> ColumnMapping {
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();
    ColumnMapping {
        name: best_column(&normalized, NAME_HEADERS),
        sku: best_column(&normalized, SKU_HEADERS),
        stock: best_column(&normalized, STOCK_HEADERS),
        min_stock: best_column(&normalized, MIN_STOCK_HEADERS),
        cost_price: best_column(&normalized, COST_HEADERS),
        sale_price: best_column(&normalized, PRICE_HEADERS),
        category: best_column(&normalized, CATEGORY_HEADERS),
        supplier: best_column(&normalized, SUPPLIER_HEADERS),
    }
}

fn best_column(normalized_headers: &[String], synonyms: &[&str]) -> Option<usize> {
    for (index, header) in normalized_headers.iter().enumerate() {
        if synonyms.iter().any(|s| header == s) {
            return Some(index);
        }
    }
    for (index, header) in normalized_headers.iter().enumerate() {
        if header.len() >= 3
            && synonyms
                .iter()
                .any(|s| header.contains(s) || (s.len() >= 3 && s.contains(header.as_str())))
        {
            return Some(index);
        }
    }
    None
}

pub fn project_rows(sheet: &Sheet, mapping: &ColumnMapping) -> AppResult<Vec<ImportRow>> {
    if mapping.name.is_none() {
        return Err(AppError::Validation(
            "mapping must include a name column".into(),
        ));
    }
    let cell = |row: &Vec<String>, idx: Option<usize>| -> Option<String> {
        idx.and_then(|i| row.get(i))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    Ok(sheet
        .rows
        .iter()
        .map(|row| ImportRow {
            name: cell(row, mapping.name).unwrap_or_default(),
            sku: cell(row, mapping.sku),
            stock: cell(row, mapping.stock),
            min_stock: cell(row, mapping.min_stock),
            cost_price: cell(row, mapping.cost_price),
            sale_price: cell(row, mapping.sale_price),
            category: cell(row, mapping.category),
            supplier: cell(row, mapping.supplier),
        })
        .collect())
}

async fn existing_normalized_names(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<HashSet<String>> {
    let names: Vec<String> = Products::find()
        .select_only()
        .column(ProdCol::Name)
        .filter(ProdCol::BusinessId.eq(user.business_id))
        .filter(ProdCol::DeletedAt.is_null())
        .into_tuple()
        .all(&state.orm)
        .await?;
    Ok(names.iter().map(|n| normalize(n)).collect())
}

/// Pure validation pass. Each row lands in exactly one bucket: invalid,
/// duplicate against the catalog, duplicate within the upload, or valid.
/// Catalog duplicates take precedence over in-list duplicates so a row is
/// never counted twice.
fn validate_rows(
    rows: &[ImportRow],
    existing: &HashSet<String>,
) -> (ValidationReport, Vec<ValidRow>) {
    let mut issues = Vec::new();
    let mut valid = Vec::new();
    let mut seen_in_list: HashSet<String> = HashSet::new();
    let mut skipped = 0_usize;

    for (index, row) in rows.iter().enumerate() {
        match check_row(index, row, existing, &mut seen_in_list) {
            RowOutcome::Ok(v) => valid.push(v),
            RowOutcome::Issue(issue) => {
                if issue.kind != RowIssueKind::Invalid {
                    skipped += 1;
                }
                issues.push(issue);
            }
        }
    }

    let failed = issues
        .iter()
        .filter(|i| i.kind == RowIssueKind::Invalid)
        .count();
    let report = ValidationReport {
        success: valid.len(),
        failed,
        skipped,
        issues,
    };
    (report, valid)
}

fn check_row(
    index: usize,
    row: &ImportRow,
    existing: &HashSet<String>,
    seen_in_list: &mut HashSet<String>,
) -> RowOutcome {
    if row.name.is_empty() {
        return RowOutcome::Issue(RowIssue {
            row: index,
            kind: RowIssueKind::Invalid,
            message: "name is required".into(),
        });
    }

    let stock = match parse_numeric::<i32>(row.stock.as_deref(), "stock") {
        Ok(v) => v,
        Err(message) => return invalid(index, message),
    };
    let min_stock = match parse_numeric::<i32>(row.min_stock.as_deref(), "min_stock") {
        Ok(v) => v,
        Err(message) => return invalid(index, message),
    };
    let cost_price = match parse_numeric::<i64>(row.cost_price.as_deref(), "cost_price") {
        Ok(v) => v,
        Err(message) => return invalid(index, message),
    };
    let sale_price = match parse_numeric::<i64>(row.sale_price.as_deref(), "sale_price") {
        Ok(v) => v,
        Err(message) => return invalid(index, message),
    };

    let normalized = normalize(&row.name);
    if existing.contains(&normalized) {
        return RowOutcome::Issue(RowIssue {
            row: index,
            kind: RowIssueKind::DuplicateInDb,
            message: format!("'{}' already exists in the catalog", row.name),
        });
    }
    if !seen_in_list.insert(normalized) {
        return RowOutcome::Issue(RowIssue {
            row: index,
            kind: RowIssueKind::DuplicateInList,
            message: format!("'{}' appears earlier in the file", row.name),
        });
    }

    RowOutcome::Ok(ValidRow {
        index,
        name: row.name.clone(),
        sku: row.sku.clone(),
        stock,
        min_stock,
        cost_price,
        sale_price,
        category: row.category.clone(),
        supplier: row.supplier.clone(),
    })
}

fn invalid(index: usize, message: String) -> RowOutcome {
    RowOutcome::Issue(RowIssue {
        row: index,
        kind: RowIssueKind::Invalid,
        message,
    })
}

fn parse_numeric<T>(value: Option<&str>, field: &str) -> Result<T, String>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = value else {
        return Ok(T::default());
    };
    let parsed = raw
        .parse::<T>()
        .map_err(|_| format!("{field} '{raw}' is not a number"))?;
    if parsed < T::default() {
        return Err(format!("{field} must not be negative"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn named_row(name: &str) -> ImportRow {
        ImportRow {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn infers_mapping_from_spanish_headers() {
        let mapping = infer_mapping(&headers(&["Nombre", "Código", "Cantidad", "Precio de Venta"]));
        assert_eq!(mapping.name, Some(0));
        assert_eq!(mapping.sku, Some(1));
        assert_eq!(mapping.stock, Some(2));
        assert_eq!(mapping.sale_price, Some(3));
        assert_eq!(mapping.supplier, None);
    }

    #[test]
    fn infers_mapping_by_containment() {
        let mapping = infer_mapping(&headers(&["Product Name", "Stock Qty"]));
        assert_eq!(mapping.name, Some(0));
        assert_eq!(mapping.stock, Some(1));
    }

    #[test]
    fn flags_db_duplicates_by_normalized_name() {
        let existing: HashSet<String> = [normalize("Café Latte")].into_iter().collect();
        let rows = vec![named_row("CAFE  LATTE"), named_row("Te Verde")];
        let (report, valid) = validate_rows(&rows, &existing);

        assert_eq!(report.success, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, RowIssueKind::DuplicateInDb);
        assert_eq!(valid[0].name, "Te Verde");
    }

    #[test]
    fn flags_list_duplicates_without_double_counting() {
        let existing: HashSet<String> = [normalize("Café Latte")].into_iter().collect();
        // Second row duplicates both the catalog and the first row; it must be
        // reported once, as a catalog duplicate.
        let rows = vec![named_row("Cafe Latte"), named_row("café latte")];
        let (report, _valid) = validate_rows(&rows, &existing);

        assert_eq!(report.success, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues.iter().all(|i| i.kind == RowIssueKind::DuplicateInDb));
    }

    #[test]
    fn flags_in_list_duplicates() {
        let existing = HashSet::new();
        let rows = vec![named_row("Agua"), named_row("AGUA "), named_row("Jugo")];
        let (report, valid) = validate_rows(&rows, &existing);

        assert_eq!(report.success, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.issues[0].kind, RowIssueKind::DuplicateInList);
        assert_eq!(report.issues[0].row, 1);
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn rejects_missing_name_and_bad_numbers() {
        let existing = HashSet::new();
        let mut bad_stock = named_row("Pan");
        bad_stock.stock = Some("muchos".into());
        let mut negative = named_row("Leche");
        negative.sale_price = Some("-5".into());
        let rows = vec![named_row(""), bad_stock, negative];
        let (report, valid) = validate_rows(&rows, &existing);

        assert_eq!(report.success, 0);
        assert_eq!(report.failed, 3);
        assert_eq!(report.skipped, 0);
        assert!(valid.is_empty());
    }

    #[test]
    fn parses_csv_with_headers() {
        let bytes = b"nombre,precio,stock\nCoca Cola,2500,10\nFanta,2300,5\n";
        let sheet = parse_sheet("products.csv", bytes).unwrap();
        assert_eq!(sheet.headers, vec!["nombre", "precio", "stock"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0][0], "Coca Cola");
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = parse_sheet("products.pdf", b"whatever").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
