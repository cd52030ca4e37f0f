use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::models::CatalogItem;
use crate::repositories::CatalogSource;
use crate::services::name_match::normalize;

const ENGLISH_ORDINALS: [&str; 12] = [
    "1st", "2nd", "3rd", "4th", "5th", "6th", "7th", "8th", "9th", "10th", "11th", "12th",
];

const SPANISH_ORDINALS: [&[&str]; 12] = [
    &["1er", "1ro", "1ero"],
    &["2do"],
    &["3er", "3ro", "3ero"],
    &["4to"],
    &["5to"],
    &["6to"],
    &["7mo"],
    &["8vo"],
    &["9no"],
    &["10mo"],
    &["11vo", "11mo"],
    &["12vo", "12mo"],
];

fn numbered_variants(n: usize) -> Vec<String> {
    let mut variants = vec![
        n.to_string(),
        format!("g{n}"),
        format!("g {n}"),
        format!("grade {n}"),
        format!("grado {n}"),
        format!("{n} grade"),
        format!("{n} grado"),
    ];
    let english = ENGLISH_ORDINALS[n - 1];
    variants.push(english.to_string());
    variants.push(format!("{english} grade"));
    for spanish in SPANISH_ORDINALS[n - 1] {
        variants.push(spanish.to_string());
        variants.push(format!("{spanish} grado"));
    }
    variants
}

/// Normalized grade label to its canonical class key.
static GRADE_VARIANTS: Lazy<HashMap<String, String>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let mut add = |key: &str, variants: Vec<String>| {
        for variant in variants {
            table.insert(normalize(&variant), key.to_string());
        }
    };

    add(
        "PK",
        ["pk", "pre-k", "prek", "pre-kinder", "prekinder", "pre-kindergarten", "prekindergarten"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    add(
        "K",
        ["k", "gk", "kinder", "kínder", "kindergarten", "kindergarden"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    for n in 1..=12 {
        add(&n.to_string(), numbered_variants(n));
    }
    table
});

/// Canonical class key of a grade label, if the label is known.
pub fn canonical_grade(label: &str) -> Option<&'static str> {
    GRADE_VARIANTS.get(&normalize(label)).map(String::as_str)
}

/// Whether two labels name the same grade. Unknown labels only equal themselves.
pub fn same_grade(a: &str, b: &str) -> bool {
    match (canonical_grade(a), canonical_grade(b)) {
        (Some(x), Some(y)) => x == y,
        _ => normalize(a) == normalize(b),
    }
}

/// Every textual variant of the grade `label` belongs to, normalized.
pub fn grade_variants(label: &str) -> Vec<String> {
    match canonical_grade(label) {
        Some(key) => {
            let mut variants: Vec<String> = GRADE_VARIANTS
                .iter()
                .filter(|(_, class)| class.as_str() == key)
                .map(|(variant, _)| variant.clone())
                .collect();
            variants.sort();
            variants
        }
        None => vec![normalize(label)],
    }
}

/// Maps a grade label to the restricted catalog books for that grade.
#[derive(Clone)]
pub struct CatalogResolver {
    catalog: Arc<dyn CatalogSource>,
}

impl CatalogResolver {
    pub fn new(catalog: Arc<dyn CatalogSource>) -> Self {
        Self { catalog }
    }

    /// Active, restricted-catalog books tagged with any variant of `grade`.
    /// An empty list is a valid answer.
    #[instrument(skip(self))]
    pub async fn resolve(&self, grade: &str) -> Result<Vec<CatalogItem>, ServiceError> {
        let variants = grade_variants(grade);
        let books: Vec<CatalogItem> = self
            .catalog
            .restricted_books()
            .await?
            .into_iter()
            .filter(|book| {
                book.grade_labels()
                    .any(|label| variants.contains(&normalize(label)))
            })
            .collect();
        debug!(variants = variants.len(), books = books.len(), "resolved grade");
        Ok(books)
    }

    /// All active books, used to match imported rows.
    pub async fn active_books(&self) -> Result<Vec<CatalogItem>, ServiceError> {
        self.catalog.active_books().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryCatalog;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn third_grade_spellings_are_one_class() {
        for label in ["3", "G3", "3rd Grade", "3er Grado", "Grade 3", "Grado 3", "3ro", " grado  3 "] {
            assert_eq!(canonical_grade(label), Some("3"), "{label}");
        }
        assert!(same_grade("7mo Grado", "7th grade"));
        assert!(same_grade("Kínder", "K"));
        assert!(!same_grade("3", "4"));
        assert!(!same_grade("PK", "K"));
    }

    #[test]
    fn unknown_labels_only_match_themselves() {
        assert_eq!(canonical_grade("Bachillerato"), None);
        assert_eq!(grade_variants("Bachillerato"), vec!["bachillerato".to_string()]);
        assert!(same_grade("Bachillerato", "bachillerato"));
    }

    fn book(grade: Option<&str>, grades: &[&str], active: bool, restricted: bool) -> CatalogItem {
        CatalogItem {
            book_id: Uuid::new_v4(),
            code: format!("B{}", Uuid::new_v4().simple()),
            name: "Book".into(),
            price: dec!(10),
            grade: grade.map(String::from),
            grades: grades.iter().map(|g| g.to_string()).collect(),
            inventory_quantity: 1,
            reserved_quantity: 0,
            active,
            restricted_catalog: restricted,
        }
    }

    #[tokio::test]
    async fn resolve_matches_any_variant_and_filters_flags() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let by_grade = book(Some("3er Grado"), &[], true, true);
        let by_list = book(None, &["2", "G3"], true, true);
        let inactive = book(Some("3"), &[], false, true);
        let open_catalog = book(Some("3"), &[], true, false);
        let other_grade = book(Some("4"), &[], true, true);
        for b in [&by_grade, &by_list, &inactive, &open_catalog, &other_grade] {
            catalog.upsert(b.clone());
        }

        let resolver = CatalogResolver::new(catalog);
        let books = resolver.resolve("Grade 3").await.unwrap();
        let ids: Vec<_> = books.iter().map(|b| b.book_id).collect();
        assert_eq!(books.len(), 2);
        assert!(ids.contains(&by_grade.book_id));
        assert!(ids.contains(&by_list.book_id));

        assert!(resolver.resolve("11").await.unwrap().is_empty());
    }
}
