//! Radix-tree route lookup.
//!
//! One tree per HTTP method, O(path-length) lookup via [`matchit`]. Built
//! once during `App::build`, read-only afterwards — every connection task
//! shares it without locks.
//!
//! Parameter constraints (`{id:[0-9]+}`) are not the tree's job: matchit
//! matches on the plain `{id}` shape and the compiled per-route regexes are
//! checked against the extracted values afterwards. A constraint miss is a
//! plain non-match, falling through to the not-found path.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::error::ConfigurationError;
use crate::method::Method;
use crate::route::Route;

#[derive(Default)]
pub(crate) struct RouteTable {
    trees: HashMap<Method, MatchitRouter<Arc<Route>>>,
}

impl RouteTable {
    /// Inserts a compiled route. A path conflict inside matchit is a
    /// configuration mistake, reported against the route's URL.
    pub(crate) fn insert(&mut self, route: Arc<Route>) -> Result<(), ConfigurationError> {
        let compiled = route
            .compiled
            .as_ref()
            .expect("routes are compiled before table insertion");
        let path = compiled.matchit_path.clone();
        self.trees
            .entry(route.method)
            .or_default()
            .insert(path, Arc::clone(&route))
            .map_err(|e| ConfigurationError::InvalidUrl {
                url: route.url().to_owned(),
                reason: e.to_string(),
            })
    }

    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(Arc<Route>, HashMap<String, String>)> {
        let tree = self.trees.get(&method)?;
        let matched = tree.at(path).ok()?;
        let route = Arc::clone(matched.value);
        let params: HashMap<String, String> = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();

        let compiled = route.compiled.as_ref()?;
        for (name, regex) in &compiled.constraints {
            let value = params.get(name)?;
            if !regex.is_match(value) {
                return None;
            }
        }
        Some((route, params))
    }
}
