//! Branch naming and main-branch discovery.
//!
//! Branch names are task-scoped, not content-addressed: re-running the same
//! task yields the same name, and the stale local branch from the earlier
//! attempt is deleted before the new one is created. That delete-then-create
//! is only safe because a project never has two sessions at once.

use crate::task::TaskKind;

/// Maximum length of the prompt-derived part of a branch name.
pub const MAX_SLUG_LEN: usize = 40;

/// Slug used when the prompt has no usable characters.
pub const FALLBACK_SLUG: &str = "update";

/// Inputs that determine a branch name.
#[derive(Debug, Clone, Copy)]
pub struct BranchRequest<'a> {
    pub issue_number: Option<u64>,
    pub kind: TaskKind,
    pub prompt: Option<&'a str>,
}

/// The branch to create and whether a stale local branch of the same name
/// must be deleted first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    pub name: String,
    pub replaces_existing: bool,
}

/// Convert free text to a branch-safe slug of at most `max_len` characters.
///
/// Lowercases, drops everything except ASCII letters, digits, whitespace and
/// hyphens, turns each whitespace run into a single hyphen, truncates, and
/// strips trailing hyphens.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.trim().to_lowercase().chars() {
        if c.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            slug.push(c);
            in_space = false;
        }
    }
    // Only ASCII survives the filter, so byte truncation is char-safe.
    slug.truncate(max_len);
    slug.trim_end_matches('-').to_string()
}

/// Derive the branch name for a task.
///
/// Issue-linked tasks always use `fix/<issue>`. Otherwise the resolved task
/// kind prefixes a slug of the prompt.
pub fn derive_branch_name<S: AsRef<str>>(
    request: &BranchRequest<'_>,
    existing: &[S],
) -> BranchPlan {
    let name = match request.issue_number {
        Some(number) => format!("fix/{}", number),
        None => {
            let prompt = request.prompt.unwrap_or_default();
            let slug = slugify(prompt, MAX_SLUG_LEN);
            let slug = if slug.is_empty() {
                FALLBACK_SLUG.to_string()
            } else {
                slug
            };
            format!("{}/{}", request.kind.resolve(prompt).branch_prefix(), slug)
        }
    };
    let replaces_existing = existing.iter().any(|b| b.as_ref() == name);
    BranchPlan {
        name,
        replaces_existing,
    }
}

/// Pick the main branch from known branch names (local names like `main` or
/// remote-tracking names like `origin/main`). Prefers `main`, then `master`,
/// and defaults to `main`.
pub fn select_main_branch<S: AsRef<str>>(branches: &[S]) -> &'static str {
    let has = |wanted: &str| {
        branches.iter().any(|b| {
            let b = b.as_ref();
            b == wanted || b.strip_prefix("origin/") == Some(wanted)
        })
    };
    if has("main") {
        "main"
    } else if has("master") {
        "master"
    } else {
        "main"
    }
}
