//! Recipe URL heuristics.

use url::Url;

use crate::models::SettingsMap;

use super::profile::EffectiveProfile;

/// Paths that are never recipes, whatever the publisher.
const GLOBAL_BLOCKED_PATHS: &[&str] =
    &["/privacy", "/terms", "/about", "/login", "/signin", "/cookie"];

/// Path fragments that suggest a recipe when no profile applies.
const GENERIC_RECIPE_PATHS: &[&str] =
    &["/recipe/", "/recipes/", "/cocktail/", "/cocktails/", "/drink/"];

/// Drop the fragment and query string.
pub fn normalize_url(url: &str) -> String {
    let url = url.split('#').next().unwrap_or(url);
    let url = url.split('?').next().unwrap_or(url);
    url.trim().to_string()
}

/// Lowercased path with a leading slash and no trailing slash (except `/`).
pub fn normalized_path(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().trim().to_lowercase())
        .unwrap_or_default();
    let mut path = if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    };
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}

fn has_any_token(path: &str, tokens: &[String]) -> bool {
    tokens.iter().any(|token| {
        let token = token.trim().to_lowercase();
        !token.is_empty() && path.contains(&token)
    })
}

/// Whether a link looks like a single recipe page.
///
/// With a domain profile, the path must contain one of the profile's recipe
/// hints followed by something more (so `/recipes/` index pages are
/// rejected). Without one, generic recipe path fragments decide.
pub fn is_probable_recipe_url(url: &str, settings: &SettingsMap) -> bool {
    let path = normalized_path(url);
    let profile = EffectiveProfile::resolve(url, settings);
    if let Some(profile) = &profile {
        if has_any_token(&path, &profile.blocked_path_hints) {
            return false;
        }
    }
    if GLOBAL_BLOCKED_PATHS.iter().any(|token| path.contains(token)) {
        return false;
    }

    match profile {
        Some(profile) => profile.recipe_path_hints.iter().any(|hint| {
            let hint = hint.trim().to_lowercase();
            let hint = hint.trim_end_matches('/');
            if hint.is_empty() {
                return false;
            }
            match path.split_once(hint) {
                Some((_, tail)) => !tail.trim_matches('/').is_empty(),
                None => false,
            }
        }),
        None => {
            let lowered = url.to_lowercase();
            GENERIC_RECIPE_PATHS.iter().any(|token| lowered.contains(token))
        }
    }
}
