//! Deterministic document ids.
//!
//! An id is a UUID v5 (URL namespace) over `<cleaned_path>?prompt=<category>`,
//! with `&commit=<sha>` appended for commit-scoped records. Resubmitting the same
//! logical fact therefore overwrites the earlier record instead of adding one.

use uuid::Uuid;

pub fn document_id(cleaned_path: &str, category: &str, commit: Option<&str>) -> String {
    let name = match commit {
        Some(sha) => format!("{cleaned_path}?prompt={category}&commit={sha}"),
        None => format!("{cleaned_path}?prompt={category}"),
    };
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}
