// Document unit tests: fixtures, selectors and snapshots through the public API

use live_watermark::document::{Dimensions, Document, MemoryDocument, PageFixture};

const SHOP_PAGE: &str = r##"
body_attributes:
  class: shop
body:
  - tag: header
    children:
      - tag: img
        attributes:
          src: logo.png
        width: 80
        height: 40
  - tag: main
    attributes:
      id: products
      class: grid wide
    children:
      - tag: img
        attributes:
          src: shoe.jpg
          width: "600"
          height: "400"
      - tag: div
        children:
          - tag: img
            attributes:
              src: boot.jpg
              srcset: "boot.jpg 1x, boot@2x.jpg 2x"
            width: 300
            height: 300
"##;

fn shop() -> MemoryDocument {
    let fixture = PageFixture::from_yaml(SHOP_PAGE).expect("Failed to parse fixture");
    MemoryDocument::from_fixture(&fixture)
}

#[test]
fn test_compound_selectors() {
    let doc = shop();
    let main = doc.query_selector("main#products.grid").unwrap();
    assert_eq!(doc.query_selector(".wide"), Some(main));
    assert_eq!(doc.query_selector("#products"), Some(main));
    assert_eq!(doc.query_selector("main.narrow"), None);
    assert_eq!(doc.query_selector("body"), Some(doc.body()));
    assert_eq!(doc.query_selector("main products"), None);
}

#[test]
fn test_images_under_container_only() {
    let doc = shop();
    let main = doc.query_selector("#products").unwrap();

    let sources: Vec<_> = doc
        .images_under(main)
        .into_iter()
        .map(|id| doc.attribute(id, "src").unwrap())
        .collect();
    assert_eq!(sources, vec!["shoe.jpg", "boot.jpg"]);
    assert_eq!(doc.images_under(doc.body()).len(), 3);
}

#[test]
fn test_fixture_dimensions_prefer_explicit_size() {
    let doc = shop();
    let images = doc.images_under(doc.body());
    assert_eq!(doc.dimensions(images[0]), Some(Dimensions::new(80, 40)));
    assert_eq!(doc.dimensions(images[1]), Some(Dimensions::new(600, 400)));
    assert_eq!(doc.dimensions(images[2]), Some(Dimensions::new(300, 300)));
}

#[test]
fn test_snapshot_serializes_to_json() {
    let doc = shop();
    let snapshot = doc.snapshot().unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["tag"], "html");
    assert_eq!(json["children"][0]["attributes"]["class"], "shop");
    assert_eq!(
        json["children"][0]["children"][1]["children"][1]["children"][0]["attributes"]["srcset"],
        "boot.jpg 1x, boot@2x.jpg 2x"
    );
}

#[test]
fn test_detached_nodes_are_not_contained() {
    let doc = shop();
    let main = doc.query_selector("#products").unwrap();
    let images = doc.images_under(main);

    assert!(doc.contains(images[0]));
    assert!(doc.remove(main));
    assert!(!doc.contains(main));
    assert!(!doc.contains(images[0]));
    assert!(!doc.remove(main));
    assert_eq!(doc.query_selector("#products"), None);
}
