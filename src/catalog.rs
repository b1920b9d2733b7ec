use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::CatalogError;
use crate::types::Product;

/// Static product list, looked up by exact detector class label.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
    by_name: HashMap<String, usize>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::with_capacity(products.len());
        for (i, product) in products.iter().enumerate() {
            if product.name.is_empty() {
                return Err(CatalogError::EmptyName(product.id));
            }
            if !product.price.is_finite() || product.price < 0.0 {
                return Err(CatalogError::InvalidPrice {
                    name: product.name.clone(),
                    price: product.price,
                });
            }
            if by_name.insert(product.name.clone(), i).is_some() {
                return Err(CatalogError::DuplicateName(product.name.clone()));
            }
        }
        Ok(Self { products, by_name })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let products: Vec<Product> =
            serde_json::from_str(content).context("Catalog must be a JSON array of products")?;
        Ok(Self::new(products)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let catalog = Self::from_json(&content)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))?;
        tracing::info!(path = %path.display(), products = catalog.len(), "Loaded product catalog");
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Product> {
        self.by_name.get(name).map(|&i| &self.products[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
