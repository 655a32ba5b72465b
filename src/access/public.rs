//! PathClassifier: decides whether a `(path, method)` pair needs no authorization.

use std::{collections::HashSet, fs, path::Path};

use axum::http::Method;
use serde::Deserialize;
use thiserror::Error;

use super::template::{PathTemplate, TemplateError, split_path};

/// Prefixes under which the API documentation is served. Always public.
pub const DOCS_PREFIXES: &[&str] = &["/swagger-ui", "/api-docs"];

#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error("invalid public route template {template}: {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: TemplateError,
    },
    #[error("unknown method '{method}' for public route {template}")]
    UnknownMethod { template: String, method: String },
    #[error("public route {template} declares no methods")]
    EmptyMethods { template: String },
    #[error("public route {template} declares {method} more than once")]
    DuplicateRoute { template: String, method: String },
    #[error("failed to read public route table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse public route table {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry of the public-route table as written in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteSpec {
    pub path: String,
    pub methods: Vec<String>,
}

impl RouteSpec {
    pub fn new(path: &str, methods: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// A compiled public route. Specs with the same template shape are merged here.
#[derive(Debug, Clone)]
pub struct PublicRoute {
    pub template: PathTemplate,
    pub allowed_methods: HashSet<Method>,
}

/// The routes reachable without a credential.
pub fn default_public_routes() -> Vec<RouteSpec> {
    vec![
        RouteSpec::new("/health", &["GET"]),
        RouteSpec::new("/v1/cars", &["GET"]),
        RouteSpec::new("/v1/cars/search", &["GET"]),
        RouteSpec::new("/v1/cars/{id}", &["GET"]),
        RouteSpec::new("/v1/cars/{id}/review_count_increment", &["PUT"]),
        RouteSpec::new("/v1/cars/{id}/images", &["GET"]),
        RouteSpec::new("/v1/images/{id}", &["GET"]),
        RouteSpec::new("/v1/saved_cars/{user_id}", &["GET"]),
        RouteSpec::new("/v1/notifications", &["POST"]),
        RouteSpec::new("/v1/notifications/{user_id}", &["GET"]),
        RouteSpec::new("/v1/notifications/unread/{user_id}", &["GET"]),
        RouteSpec::new("/v1/notifications/{id}/read", &["PUT"]),
        RouteSpec::new("/v1/notifications/{id}", &["DELETE"]),
        RouteSpec::new("/v1/notifications_tokens/{user_id}", &["GET"]),
        RouteSpec::new("/v1/comments/{car_id}", &["GET"]),
    ]
}

/// PathClassifier
///
/// Holds the public routes sorted from most to least specific. Immutable after
/// construction and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    routes: Vec<PublicRoute>,
}

impl PathClassifier {
    /// Compiles and validates the table. Fails on malformed templates, unknown or
    /// missing methods, and on a `(shape, method)` pair declared twice.
    pub fn new<I>(specs: I) -> Result<Self, RouteTableError>
    where
        I: IntoIterator<Item = RouteSpec>,
    {
        let mut routes: Vec<PublicRoute> = Vec::new();

        for spec in specs {
            let template: PathTemplate =
                spec.path
                    .parse()
                    .map_err(|source| RouteTableError::InvalidTemplate {
                        template: spec.path.clone(),
                        source,
                    })?;
            if spec.methods.is_empty() {
                return Err(RouteTableError::EmptyMethods {
                    template: spec.path,
                });
            }

            let idx = match routes.iter().position(|r| r.template.same_shape(&template)) {
                Some(idx) => idx,
                None => {
                    routes.push(PublicRoute {
                        template,
                        allowed_methods: HashSet::new(),
                    });
                    routes.len() - 1
                }
            };

            for raw in &spec.methods {
                let method = parse_method(raw).ok_or_else(|| RouteTableError::UnknownMethod {
                    template: spec.path.clone(),
                    method: raw.clone(),
                })?;
                if !routes[idx].allowed_methods.insert(method) {
                    return Err(RouteTableError::DuplicateRoute {
                        template: spec.path.clone(),
                        method: raw.clone(),
                    });
                }
            }
        }

        routes.sort_by(|a, b| b.template.specificity_cmp(&a.template));
        Ok(Self { routes })
    }

    pub fn with_defaults() -> Result<Self, RouteTableError> {
        Self::new(default_public_routes())
    }

    /// Loads a JSON array of `{"path": ..., "methods": [...]}` objects.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RouteTableError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| RouteTableError::Io {
            path: display.clone(),
            source,
        })?;
        let specs: Vec<RouteSpec> =
            serde_json::from_str(&raw).map_err(|source| RouteTableError::Parse {
                path: display,
                source,
            })?;
        Self::new(specs)
    }

    pub fn routes(&self) -> &[PublicRoute] {
        &self.routes
    }

    /// True when the most specific template matching `path` allows `method`, or when
    /// `path` lives under a documentation prefix. A malformed path is never public.
    ///
    /// `HEAD` is admitted wherever `GET` is, since the router answers it with the GET
    /// handler.
    pub fn is_public(&self, path: &str, method: &Method) -> bool {
        if is_docs_path(path) {
            return true;
        }
        let Ok(segments) = split_path(path) else {
            return false;
        };
        let Some(route) = self
            .routes
            .iter()
            .find(|route| route.template.matches(&segments))
        else {
            return false;
        };
        route.allowed_methods.contains(method)
            || (*method == Method::HEAD && route.allowed_methods.contains(&Method::GET))
    }
}

fn is_docs_path(path: &str) -> bool {
    DOCS_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Accepts the standard HTTP verbs only, case-insensitively.
pub(crate) fn parse_method(raw: &str) -> Option<Method> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        "HEAD" => Some(Method::HEAD),
        "OPTIONS" => Some(Method::OPTIONS),
        _ => None,
    }
}
