//! Registry of platform adapters with lazy, cached construction.
//!
//! Factories are registered at process start. An adapter instance is built
//! the first time its platform is requested and reused until the adapter
//! settings change. Concurrent first lookups share a single construction.

use super::{AdapterSettings, InventoryAdapter, google_analytics, hubspot, salesforce};
use crate::error::{InventoryError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::OnceCell;

/// Builds an adapter from settings.
pub type AdapterFactory =
    Arc<dyn Fn(&AdapterSettings) -> Result<Arc<dyn InventoryAdapter>> + Send + Sync>;

/// Normalizes a connection discriminator into a registry key.
///
/// Lowercases and maps spaces and hyphens to underscores, so
/// "Google Analytics" and "google-analytics" both resolve to
/// `google_analytics`.
pub fn normalize_platform_key(platform: &str) -> String {
    platform
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// One cached adapter and the settings it was built with.
struct CachedAdapter {
    settings: AdapterSettings,
    cell: Arc<OnceCell<Arc<dyn InventoryAdapter>>>,
}

impl CachedAdapter {
    fn new(settings: AdapterSettings) -> Self {
        Self {
            settings,
            cell: Arc::new(OnceCell::new()),
        }
    }
}

/// Platform adapter registry.
///
/// # Example
/// ```rust
/// use cdp_inventory_core::adapters::{AdapterRegistry, AdapterSettings};
///
/// let registry = AdapterRegistry::with_default_platforms(AdapterSettings::default());
/// let platforms: Vec<&str> = registry.platforms().collect();
/// assert_eq!(platforms, ["google_analytics", "hubspot", "salesforce"]);
/// ```
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
    settings: RwLock<AdapterSettings>,
    instances: Mutex<HashMap<String, CachedAdapter>>,
    constructed: AtomicUsize,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new(settings: AdapterSettings) -> Self {
        Self {
            factories: BTreeMap::new(),
            settings: RwLock::new(settings),
            instances: Mutex::new(HashMap::new()),
            constructed: AtomicUsize::new(0),
        }
    }

    /// Creates a registry with Salesforce, HubSpot and Google Analytics registered.
    pub fn with_default_platforms(settings: AdapterSettings) -> Self {
        let mut registry = Self::new(settings);
        registry.register(salesforce::DESCRIPTOR.key, |settings: &AdapterSettings| {
            Ok(Arc::new(salesforce::SalesforceAdapter::new(settings)?) as Arc<dyn InventoryAdapter>)
        });
        registry.register(hubspot::DESCRIPTOR.key, |settings: &AdapterSettings| {
            Ok(Arc::new(hubspot::HubSpotAdapter::new(settings)?) as Arc<dyn InventoryAdapter>)
        });
        registry.register(
            google_analytics::DESCRIPTOR.key,
            |settings: &AdapterSettings| {
                Ok(Arc::new(google_analytics::GoogleAnalyticsAdapter::new(settings)?)
                    as Arc<dyn InventoryAdapter>)
            },
        );
        registry
    }

    /// Registers (or replaces) the factory for a platform key.
    pub fn register<F>(&mut self, platform: &str, factory: F)
    where
        F: Fn(&AdapterSettings) -> Result<Arc<dyn InventoryAdapter>> + Send + Sync + 'static,
    {
        let key = normalize_platform_key(platform);
        self.instances
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        self.factories.insert(key, Arc::new(factory));
    }

    /// Registered platform keys in sorted order.
    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// True when a factory is registered for the discriminator.
    pub fn is_registered(&self, platform: &str) -> bool {
        self.factories.contains_key(&normalize_platform_key(platform))
    }

    /// Current adapter settings.
    pub fn settings(&self) -> AdapterSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the adapter settings.
    ///
    /// Cached adapters built with different settings are rebuilt on their
    /// next lookup; lookups already in progress keep the adapter they got.
    pub fn update_settings(&self, settings: AdapterSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        tracing::debug!("Adapter settings updated; cached adapters will be rebuilt");
    }

    /// Number of adapter constructions performed so far.
    pub fn constructed_count(&self) -> usize {
        self.constructed.load(Ordering::Relaxed)
    }

    /// Returns the adapter for a connection discriminator, building it if needed.
    ///
    /// # Errors
    /// Returns `InventoryError::UnknownPlatform` when nothing is registered
    /// for the discriminator, or the factory's error if construction fails.
    /// A failed construction is not cached.
    pub async fn resolve(&self, platform: &str) -> Result<Arc<dyn InventoryAdapter>> {
        let key = normalize_platform_key(platform);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| InventoryError::unknown_platform(platform.trim()))?;

        let settings = self.settings();
        let cell = {
            let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
            let cached = instances
                .entry(key.clone())
                .or_insert_with(|| CachedAdapter::new(settings.clone()));
            if cached.settings != settings {
                *cached = CachedAdapter::new(settings.clone());
            }
            Arc::clone(&cached.cell)
        };

        let adapter = cell
            .get_or_try_init(|| async {
                self.constructed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(platform = %key, "Constructing platform adapter");
                settings.validate()?;
                factory(&settings)
            })
            .await?;

        Ok(Arc::clone(adapter))
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.factories.keys().collect::<Vec<_>>())
            .field("constructed", &self.constructed_count())
            .finish_non_exhaustive()
    }
}
