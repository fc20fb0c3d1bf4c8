use docchat_core::types::SearchFilter;

fn quote(s: &str) -> String { format!("'{}'", s.replace('\'', "''")) }

/// Render a filter as a LanceDB SQL predicate over the scalar columns.
/// Returns `None` when the filter constrains nothing.
pub fn filter_to_sql(filter: &SearchFilter) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(doc) = &filter.document_id { clauses.push(format!("document_id = {}", quote(doc))); }
    if let Some((lo, hi)) = filter.page_range { clauses.push(format!("page_number >= {} AND page_number <= {}", lo, hi)); }
    if let Some(strategy) = filter.strategy { clauses.push(format!("strategy = {}", quote(strategy.as_str()))); }
    if let Some(language) = &filter.language { clauses.push(format!("language = {}", quote(language))); }
    if let Some(modality) = filter.modality { clauses.push(format!("modality = {}", quote(modality.as_str()))); }
    if clauses.is_empty() { None } else { Some(clauses.join(" AND ")) }
}
