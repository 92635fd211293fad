use serde_json::{Value, json};

use crate::collection::item_date;
use crate::item::{Item, PathKind};

pub const DEFAULT_MAX_PAGE: usize = 5;
pub const DEFAULT_PROVIDER: &str = "site.posts";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    #[error("Unknown generator '{generator}' on item '{id}'")]
    UnknownGenerator { id: String, generator: String },

    #[error("Item '{id}': 'max_page' must be a positive integer")]
    InvalidMaxPage { id: String },

    #[error("Item '{id}': provider '{provider}' must look like 'site.<collection>'")]
    InvalidProvider { id: String, provider: String },
}

/// Name of the generator the item asks for, if any.
pub fn generator_name(item: &Item) -> Option<&str> {
    item.str_attribute("generator")
}

/// Splits a collection into pages of `max_page` items.
///
/// The template item becomes page 1. Page N is a copy with id
/// `<dir>/page<N>/<file>` and permalink `/<dir>/page<N>/`. Every page carries
/// a `paginator` attribute listing the ids of its items; ids are resolved to
/// item summaries when the page payload is built.
#[derive(Debug, Default)]
pub struct PaginationGenerator;

impl PaginationGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Collection the template paginates over.
    pub fn provider(&self, template: &Item) -> Result<String, GeneratorError> {
        let provider = template
            .str_attribute("provider")
            .unwrap_or(DEFAULT_PROVIDER);
        provider
            .strip_prefix("site.")
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| GeneratorError::InvalidProvider {
                id: template.id().to_string(),
                provider: provider.to_string(),
            })
    }

    pub fn generate(&self, template: &Item, provided: &[&Item]) -> Result<Vec<Item>, GeneratorError> {
        let per_page = match template.attribute("max_page") {
            None => DEFAULT_MAX_PAGE,
            Some(value) => value
                .as_u64()
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| GeneratorError::InvalidMaxPage {
                    id: template.id().to_string(),
                })?,
        };

        let mut sorted = provided.to_vec();
        sorted.sort_by(|a, b| item_date(b).cmp(&item_date(a)));
        let ids: Vec<&str> = sorted.iter().map(|item| item.id()).collect();

        let chunks: Vec<&[&str]> = if ids.is_empty() {
            vec![ids.as_slice()]
        } else {
            ids.chunks(per_page).collect()
        };
        let total_pages = chunks.len();
        let page_ids: Vec<String> = (1..=total_pages)
            .map(|page| page_id(template.id(), page))
            .collect();

        let mut pages = Vec::with_capacity(total_pages);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let page = index + 1;
            let id = &page_ids[index];

            let mut attributes = template.attributes().clone();
            attributes.remove("generator");
            if page > 1 {
                attributes.insert(
                    "permalink".to_string(),
                    Value::String(page_url(template.id(), page)),
                );
            }
            attributes.insert(
                "paginator".to_string(),
                json!({
                    "items": chunk,
                    "per_page": per_page,
                    "page": page,
                    "total_pages": total_pages,
                    "total_items": ids.len(),
                    "previous_page": (page > 1).then(|| page - 1),
                    "next_page": (page < total_pages).then(|| page + 1),
                    "previous_page_id": index.checked_sub(1).map(|i| page_ids[i].clone()),
                    "next_page_id": page_ids.get(index + 1),
                }),
            );

            let raw = template.latest_content();
            let mut item = Item::new(id.clone(), raw).with_attributes(attributes);
            if let Ok(source) = template.path(PathKind::Source) {
                item.set_path(PathKind::Source, source);
            }
            pages.push(item);
        }

        tracing::debug!(
            template = template.id(),
            pages = total_pages,
            items = ids.len(),
            "Paginated"
        );
        Ok(pages)
    }
}

fn split(id: &str) -> (&str, &str) {
    id.rsplit_once('/').unwrap_or(("", id))
}

fn page_id(template_id: &str, page: usize) -> String {
    if page == 1 {
        return template_id.to_string();
    }
    match split(template_id) {
        ("", file) => format!("page{page}/{file}"),
        (dir, file) => format!("{dir}/page{page}/{file}"),
    }
}

fn page_url(template_id: &str, page: usize) -> String {
    match split(template_id) {
        ("", _) => format!("/page{page}/"),
        (dir, _) => format!("/{dir}/page{page}/"),
    }
}
