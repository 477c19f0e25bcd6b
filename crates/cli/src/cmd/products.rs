//! Implementation of the `busy products` command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use busy_lib::{Product, ProductFilter};

use super::{SetupArgs, load_project};
use crate::output::{OutputFormat, print_info, print_json, symbols};

#[derive(Debug, Serialize)]
struct ProductInfo {
  qualident: String,
  name: String,
  location: Option<String>,
  active: bool,
  runnable: bool,
  compiled: bool,
  sources: usize,
  artifact: Option<PathBuf>,
}

impl ProductInfo {
  fn of(product: &Product<'_>) -> Self {
    Self {
      qualident: product.qualident(),
      name: product.name(),
      location: product.location().map(|l| l.to_string()),
      active: product.is_enabled(),
      runnable: product.is_runnable(),
      compiled: product.is_compiled(),
      sources: product.all_file_paths(false, false).len(),
      artifact: product.executable(true),
    }
  }
}

/// List the products of all modules, submodules first.
pub fn cmd_products(dir: &Path, setup: &SetupArgs, only_active: bool, output: OutputFormat) -> Result<bool> {
  let Some(project) = load_project(dir, setup)? else {
    return Ok(false);
  };

  let products: Vec<ProductInfo> = project
    .all_products(ProductFilter::AllProducts, only_active)
    .iter()
    .map(ProductInfo::of)
    .collect();

  if output.is_json() {
    print_json(&products)?;
    return Ok(true);
  }

  if products.is_empty() {
    print_info("No products");
    return Ok(true);
  }
  for p in &products {
    let mut flags = Vec::new();
    if p.active {
      flags.push("active");
    }
    if p.runnable {
      flags.push("runnable");
    }
    let flags = if flags.is_empty() {
      String::new()
    } else {
      format!(" [{}]", flags.join(", "))
    };
    match &p.artifact {
      Some(artifact) if p.compiled => println!(
        "  {} {}{} {} {}",
        symbols::INFO,
        p.qualident,
        flags,
        symbols::ARROW,
        artifact.display()
      ),
      _ => println!("  {} {}{}", symbols::INFO, p.qualident, flags),
    }
  }
  Ok(true)
}
