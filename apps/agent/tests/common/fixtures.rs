//! Catalog fixtures shared by integration tests

use cadence_agent::models::CatalogItem;

pub fn lofi_catalog() -> Vec<CatalogItem> {
    vec![CatalogItem::new("PL1", "Lofi Beats")]
}

/// A handful of playlists with distinct vocabulary
pub fn mixed_catalog() -> Vec<CatalogItem> {
    vec![
        CatalogItem::new("PLchill001", "Chill Lofi Study Beats"),
        CatalogItem::new("PLgym0002", "Heavy Metal Gym Workout"),
        CatalogItem::new("PLjazz003", "Sunday Morning Jazz"),
        CatalogItem::new("PLrain004", "Rain Sounds for Sleep"),
        CatalogItem::new("PLroad005", "Road Trip Classic Rock"),
    ]
}
