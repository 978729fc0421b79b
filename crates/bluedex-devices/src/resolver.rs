/*!
 * Adapter identifier resolution.
 */
use std::sync::Arc;

use tracing::debug;

use bluedex_core::error::Result;

use crate::adapter::Adapter;
use crate::connection::BusConnection;
use crate::registry::AdapterIndex;

/// Resolves an adapter address or interface name to an [`Adapter`].
///
/// Adapters can show up after start-up (hot-plug, radio power-on), so a miss
/// against the cached index triggers exactly one rescan before giving up.
#[derive(Debug)]
pub struct AdapterResolver<'a> {
    index: &'a AdapterIndex,
    connection: &'a BusConnection,
}

impl<'a> AdapterResolver<'a> {
    /// Create a resolver over `index`
    pub fn new(index: &'a AdapterIndex, connection: &'a BusConnection) -> Self {
        Self { index, connection }
    }

    /// Resolve `ident`, or the default adapter when `ident` is `None`.
    ///
    /// Returns `Ok(None)` when nothing matches after the rescan. Only
    /// transport failures during a rescan are errors.
    pub async fn resolve(&self, ident: Option<&str>) -> Result<Option<Arc<Adapter>>> {
        let ident = match ident {
            Some(ident) => ident.to_string(),
            None => {
                if self.index.default_address().is_none() {
                    debug!("No default adapter yet, scanning for adapters");
                    self.index.rebuild(self.connection).await?;
                }
                match self.index.default_address() {
                    Some(address) => address,
                    None => {
                        debug!("No adapter available to act as default");
                        return Ok(None);
                    }
                }
            }
        };

        if let Some(adapter) = self.index.lookup(&ident) {
            return Ok(Some(adapter));
        }

        debug!("Adapter {} not in index, rescanning once", ident);
        let found = self.index.rebuild(self.connection).await?;
        if found.is_empty() {
            return Ok(None);
        }
        Ok(self.index.lookup(&ident))
    }
}
