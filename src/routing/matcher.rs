//! Gateway path matching.
//!
//! `/api/{project}/{service}/{rest}` resolves to the service key
//! `{project}-{service}` and the suffix `/{rest}` forwarded downstream.
//! The query string is not part of the match and is carried separately.

use crate::error::GatewayError;

pub const API_PREFIX: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub project: String,
    pub service: String,
    /// Path forwarded to the instance, always starting with `/`.
    pub suffix: String,
}

impl RouteTarget {
    /// Registry key, `{project}-{service}`.
    pub fn service_key(&self) -> String {
        format!("{}-{}", self.project, self.service)
    }
}

/// Split a gateway path into project, service and suffix.
pub fn parse_route(path: &str) -> Result<RouteTarget, GatewayError> {
    let rest = path
        .strip_prefix(API_PREFIX)
        .filter(|r| r.is_empty() || r.starts_with('/'))
        .ok_or_else(|| GatewayError::InvalidProject(path.to_string()))?;
    let rest = rest.trim_start_matches('/');

    let (project, rest) = split_segment(rest);
    if project.is_empty() {
        return Err(GatewayError::InvalidProject(path.to_string()));
    }

    let (service, rest) = split_segment(rest);
    if service.is_empty() {
        return Err(GatewayError::InvalidService(path.to_string()));
    }

    Ok(RouteTarget {
        project: project.to_string(),
        service: service.to_string(),
        suffix: format!("/{}", rest),
    })
}

fn split_segment(path: &str) -> (&str, &str) {
    match path.split_once('/') {
        Some((segment, rest)) => (segment, rest),
        None => (path, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_key_and_suffix() {
        let target = parse_route("/api/proj1/foo/bar/baz").unwrap();
        assert_eq!(target.project, "proj1");
        assert_eq!(target.service, "foo");
        assert_eq!(target.service_key(), "proj1-foo");
        assert_eq!(target.suffix, "/bar/baz");
    }

    #[test]
    fn test_empty_suffix_becomes_root() {
        assert_eq!(parse_route("/api/p/s").unwrap().suffix, "/");
        assert_eq!(parse_route("/api/p/s/").unwrap().suffix, "/");
    }

    #[test]
    fn test_trailing_slash_is_preserved() {
        assert_eq!(parse_route("/api/p/s/items/").unwrap().suffix, "/items/");
    }

    #[test]
    fn test_missing_project() {
        for path in ["/api", "/api/", "/apix/p/s"] {
            assert!(
                matches!(parse_route(path), Err(GatewayError::InvalidProject(_))),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_missing_service() {
        for path in ["/api/proj1", "/api/proj1/", "/api/proj1//x"] {
            assert!(
                matches!(parse_route(path), Err(GatewayError::InvalidService(_))),
                "{}",
                path
            );
        }
    }
}
