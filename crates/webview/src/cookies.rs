//! Cookie operations on the engine's global cookie manager
//!
//! Cookies are addressed by domain only; the URL handed to the engine is
//! always `http://<domain>/`.

use std::collections::BTreeMap;
use url::Url;

use crate::engine::{Cookie, CookieManager, CookieVisitor};
use crate::error::Result;

/// Visit result: domain -> cookie name -> value
pub type CookieJar = BTreeMap<String, BTreeMap<String, String>>;

pub fn cookie_url(domain: &str) -> Result<Url> {
    let host = domain.trim().trim_start_matches('.');
    Ok(Url::parse(&format!("http://{}/", host))?)
}

/// Plain host cookie: path `/`, neither secure nor http-only
pub fn host_cookie(domain: &str, name: &str, value: &str) -> Cookie {
    Cookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: domain.to_string(),
        path: "/".to_string(),
        secure: false,
        http_only: false,
    }
}

pub fn group(cookies: Vec<Cookie>) -> CookieJar {
    let mut jar = CookieJar::new();
    for cookie in cookies {
        jar.entry(cookie.domain)
            .or_default()
            .insert(cookie.name, cookie.value);
    }
    jar
}

/// Returns false when the engine has no cookie manager
pub fn set(
    manager: Option<&mut dyn CookieManager>,
    domain: &str,
    name: &str,
    value: &str,
) -> Result<bool> {
    let url = cookie_url(domain)?;
    let Some(manager) = manager else {
        tracing::debug!(domain = %domain, "No cookie manager, set ignored");
        return Ok(false);
    };
    manager.set_cookie(&url, host_cookie(domain, name, value));
    Ok(true)
}

pub fn delete(manager: Option<&mut dyn CookieManager>, domain: &str, name: &str) -> Result<bool> {
    let url = cookie_url(domain)?;
    let Some(manager) = manager else {
        tracing::debug!(domain = %domain, "No cookie manager, delete ignored");
        return Ok(false);
    };
    manager.delete_cookies(&url, name);
    Ok(true)
}

/// Visit every cookie; `done` gets an empty jar when there is no manager
pub fn visit_all<F>(manager: Option<&mut dyn CookieManager>, done: F)
where
    F: FnOnce(CookieJar) + Send + 'static,
{
    match manager {
        Some(manager) => manager.visit_all(grouping(done)),
        None => done(CookieJar::new()),
    }
}

/// Visit the cookies sent to `url`
pub fn visit_url<F>(
    manager: Option<&mut dyn CookieManager>,
    url: &Url,
    include_http_only: bool,
    done: F,
) where
    F: FnOnce(CookieJar) + Send + 'static,
{
    match manager {
        Some(manager) => manager.visit_url(url, include_http_only, grouping(done)),
        None => done(CookieJar::new()),
    }
}

fn grouping<F>(done: F) -> CookieVisitor
where
    F: FnOnce(CookieJar) + Send + 'static,
{
    let mut guard = VisitGuard { done: Some(done) };
    Box::new(move |cookies| guard.finish(group(cookies)))
}

/// Answers with an empty jar if the engine drops the visitor unvisited
struct VisitGuard<F: FnOnce(CookieJar)> {
    done: Option<F>,
}

impl<F: FnOnce(CookieJar)> VisitGuard<F> {
    fn finish(&mut self, jar: CookieJar) {
        if let Some(done) = self.done.take() {
            done(jar);
        }
    }
}

impl<F: FnOnce(CookieJar)> Drop for VisitGuard<F> {
    fn drop(&mut self) {
        if self.done.is_some() {
            tracing::debug!("Cookie visitor dropped without visiting");
            self.finish(CookieJar::new());
        }
    }
}
