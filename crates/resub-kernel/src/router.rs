use serde::{Deserialize, Serialize};

use resub_types::Pulse;

/// A registered federation endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub endpoint: String,
    pub registered_at: Pulse,
}

/// Immutable map from DID to endpoint.
///
/// Registering a route yields a new table that shares structure with this
/// one; earlier snapshots keep theirs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: im::OrdMap<String, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this table with `did` routed to `endpoint`. An existing route
    /// for `did` is replaced.
    pub fn with_route(
        &self,
        did: impl Into<String>,
        endpoint: impl Into<String>,
        registered_at: Pulse,
    ) -> Self {
        Self {
            routes: self.routes.update(
                did.into(),
                Route {
                    endpoint: endpoint.into(),
                    registered_at,
                },
            ),
        }
    }

    pub fn resolve(&self, did: &str) -> Option<&Route> {
        self.routes.get(did)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Route)> {
        self.routes.iter().map(|(did, route)| (did.as_str(), route))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_route_leaves_original_untouched() {
        let empty = RouteTable::new();
        let one = empty.with_route("did:resub:a", "https://a.example", 3);
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(one.resolve("did:resub:a").unwrap().endpoint, "https://a.example");
        assert_eq!(one.resolve("did:resub:a").unwrap().registered_at, 3);
        assert!(one.resolve("did:resub:b").is_none());
    }

    #[test]
    fn re_registering_replaces_endpoint() {
        let table = RouteTable::new()
            .with_route("did:x", "tcp://old", 1)
            .with_route("did:x", "tcp://new", 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("did:x").unwrap().endpoint, "tcp://new");
    }

    #[test]
    fn iterates_in_did_order() {
        let table = RouteTable::new()
            .with_route("did:b", "b", 1)
            .with_route("did:a", "a", 2);
        let dids: Vec<&str> = table.iter().map(|(did, _)| did).collect();
        assert_eq!(dids, vec!["did:a", "did:b"]);
    }
}
