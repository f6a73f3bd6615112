//! Static site objects.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::AssetError;
use crate::resource::SiteContentSpec;

/// One object to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteObject {
  pub key: String,
  pub path: PathBuf,
  pub content_type: String,
}

/// Enumerate the objects a site content declaration uploads, sorted by key.
pub fn site_objects(resource: &str, spec: &SiteContentSpec) -> Result<Vec<SiteObject>, AssetError> {
  let source = Path::new(&spec.source);
  let prefix = spec.prefix.as_deref().unwrap_or("").trim_matches('/');
  let make_key = |rel: &str| {
    if prefix.is_empty() {
      rel.to_string()
    } else {
      format!("{}/{}", prefix, rel)
    }
  };
  let object = |key: String, path: PathBuf| {
    let content_type = spec.content_type.clone().unwrap_or_else(|| content_type_for(&path));
    SiteObject {
      key,
      path,
      content_type,
    }
  };

  if source.is_file() {
    let file_name = spec
      .key
      .clone()
      .or_else(|| source.file_name().map(|n| n.to_string_lossy().into_owned()))
      .ok_or_else(|| AssetError::Missing {
        resource: resource.to_string(),
        path: source.to_path_buf(),
      })?;
    return Ok(vec![object(make_key(&file_name), source.to_path_buf())]);
  }

  if !source.is_dir() {
    return Err(AssetError::Missing {
      resource: resource.to_string(),
      path: source.to_path_buf(),
    });
  }

  let mut objects = Vec::new();
  for entry in WalkDir::new(source).sort_by_file_name().follow_links(true) {
    let entry = entry.map_err(|e| AssetError::Unreadable {
      path: source.to_path_buf(),
      message: e.to_string(),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let rel = entry
      .path()
      .strip_prefix(source)
      .unwrap_or(entry.path())
      .to_string_lossy()
      .replace('\\', "/");
    objects.push(object(make_key(&rel), entry.path().to_path_buf()));
  }

  if objects.is_empty() {
    return Err(AssetError::Empty {
      resource: resource.to_string(),
      path: source.to_path_buf(),
    });
  }

  objects.sort_by(|a, b| a.key.cmp(&b.key));
  Ok(objects)
}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> String {
  let ext = path
    .extension()
    .map(|e| e.to_string_lossy().to_ascii_lowercase())
    .unwrap_or_default();

  let mime = match ext.as_str() {
    "html" | "htm" => mime::TEXT_HTML,
    "css" => mime::TEXT_CSS,
    "js" | "mjs" => mime::TEXT_JAVASCRIPT,
    "json" | "map" => mime::APPLICATION_JSON,
    "txt" => mime::TEXT_PLAIN,
    "xml" => mime::TEXT_XML,
    "csv" => mime::TEXT_CSV,
    "svg" => mime::IMAGE_SVG,
    "png" => mime::IMAGE_PNG,
    "jpg" | "jpeg" => mime::IMAGE_JPEG,
    "gif" => mime::IMAGE_GIF,
    "bmp" => mime::IMAGE_BMP,
    "woff" => mime::FONT_WOFF,
    "woff2" => mime::FONT_WOFF2,
    "pdf" => mime::APPLICATION_PDF,
    _ => mime::APPLICATION_OCTET_STREAM,
  };
  mime.essence_str().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::write_assets;
  use tempfile::TempDir;

  fn spec(source: &Path) -> SiteContentSpec {
    SiteContentSpec {
      bucket: "site".to_string(),
      source: source.to_string_lossy().into_owned(),
      prefix: None,
      key: None,
      content_type: None,
      prune: true,
    }
  }

  #[test]
  fn directory_objects_use_relative_keys() {
    let temp = TempDir::new().unwrap();
    let (site, _) = write_assets(temp.path());

    let objects = site_objects("content", &spec(&site)).unwrap();
    let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["css/app.css", "index.html"]);
    assert_eq!(objects[1].content_type, "text/html");
    assert_eq!(objects[0].content_type, "text/css");
  }

  #[test]
  fn single_file_with_prefix() {
    let temp = TempDir::new().unwrap();
    let (site, _) = write_assets(temp.path());
    let mut spec = spec(&site.join("index.html"));
    spec.prefix = Some("/docs/".to_string());

    let objects = site_objects("content", &spec).unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].key, "docs/index.html");
  }

  #[test]
  fn missing_source_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = site_objects("content", &spec(&temp.path().join("nope"))).unwrap_err();
    assert!(matches!(err, AssetError::Missing { .. }));
  }

  #[test]
  fn empty_directory_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = site_objects("content", &spec(temp.path())).unwrap_err();
    assert!(matches!(err, AssetError::Empty { .. }));
  }

  #[test]
  fn unknown_extension_is_octet_stream() {
    assert_eq!(content_type_for(Path::new("blob.bin")), "application/octet-stream");
    assert_eq!(content_type_for(Path::new("INDEX.HTML")), "text/html");
  }
}
