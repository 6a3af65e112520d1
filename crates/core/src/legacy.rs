//! Bidirectional mapping between the legacy row layout and the block model.
//!
//! The legacy format is a map from row index to an untyped parameter bag
//! tagged with `layout_type`. Reading copies same-named keys, translates
//! renamed or rescaled keys through fixed lookup tables and fills every absent
//! key with the block model's default. Writing applies the inverse tables, so
//! `legacy_to_block(&block_to_legacy(&b), b.position) == b` for every field the
//! legacy bag can hold.
//!
//! Rows that cannot be mapped are reported, never guessed at: an unknown or
//! missing `layout_type` is a [`LegacyMappingError`] for that row only, as is
//! a row repeating the id of an earlier row.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::block::{
    BannerBackground, BannerData, BannerHeight, Block, BlockData, BlockType, CardStyle,
    ContentWidth, FeaturedProductData, ImagePosition, ListData, MasonryData, MasonryItem,
    Padding, ProductGridData, SortOrder, Spacing, TextAlignment, TextData,
};
use crate::error::CoreError;
use crate::types::{BlockId, Timestamp};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One persisted row: a `layout_type` tag plus a schema-less parameter bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_type: Option<String>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl LegacyRow {
    pub fn new(layout_type: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            layout_type: Some(layout_type.into()),
            params,
        }
    }
}

/// A page in the legacy format, keyed by row index.
pub type LegacyLayout = BTreeMap<u32, LegacyRow>;

/// A row excluded from a page load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyMappingError {
    pub row: u32,
    pub layout_type: Option<String>,
    pub reason: String,
}

impl From<LegacyMappingError> for CoreError {
    fn from(err: LegacyMappingError) -> Self {
        CoreError::LegacyMapping {
            row: err.row,
            reason: err.reason,
        }
    }
}

/// The outcome of mapping a whole legacy page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadedLayout {
    /// Successfully mapped blocks, positions renumbered to `[0, N)`.
    pub blocks: Vec<Block>,
    /// Rows that were excluded. A non-empty list means the load is incomplete.
    pub errors: Vec<LegacyMappingError>,
}

impl LoadedLayout {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Lookup tables
// ---------------------------------------------------------------------------

/// `layout_type` values accepted on read. The first entry per variant is the
/// one written back.
const LAYOUT_TYPES: &[(&str, BlockType)] = &[
    ("text", BlockType::Text),
    ("product_grid", BlockType::ProductGrid),
    ("grid", BlockType::ProductGrid),
    ("featured_product", BlockType::FeaturedProduct),
    ("featured", BlockType::FeaturedProduct),
    ("banner", BlockType::Banner),
    ("masonry", BlockType::Masonry),
    ("list", BlockType::List),
];

/// Legacy `spacing` of a text row doubles as its padding.
const SPACING_TO_PADDING: &[(Spacing, Padding)] = &[
    (Spacing::None, Padding::None),
    (Spacing::Tight, Padding::Small),
    (Spacing::Normal, Padding::Medium),
    (Spacing::Loose, Padding::Large),
];

const CARD_TYPES: &[(&str, CardStyle)] = &[
    ("simple", CardStyle::Minimal),
    ("classic", CardStyle::Standard),
    ("detailed", CardStyle::Detailed),
    ("overlay", CardStyle::Overlay),
];

const FEATURED_LAYOUTS: &[(&str, ImagePosition)] = &[
    ("image_left", ImagePosition::Left),
    ("image_right", ImagePosition::Right),
];

const BANNER_BACKGROUNDS: &[(&str, BannerBackground)] = &[
    ("color", BannerBackground::Solid),
    ("gradient", BannerBackground::Gradient),
    ("photo", BannerBackground::Image),
];

/// Pixel heights are bucketed: `(upper bound, bucket, canonical pixels)`.
const BANNER_HEIGHTS: &[(u64, BannerHeight, u64)] = &[
    (240, BannerHeight::Small, 200),
    (400, BannerHeight::Medium, 320),
    (560, BannerHeight::Large, 480),
    (u64::MAX, BannerHeight::Full, 640),
];

/// Namespace for ids derived from row indexes of rows that predate stored ids.
const LEGACY_ROW_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_52c4_0d8e_4f5a_9a3e_7c21_d0b4_e915);

/// Map a legacy `layout_type` onto a block variant.
pub fn block_type_for(layout_type: &str) -> Option<BlockType> {
    LAYOUT_TYPES
        .iter()
        .find(|(name, _)| *name == layout_type)
        .map(|(_, block_type)| *block_type)
}

pub fn padding_for_spacing(spacing: Spacing) -> Padding {
    SPACING_TO_PADDING
        .iter()
        .find(|(s, _)| *s == spacing)
        .map_or(Padding::Medium, |(_, p)| *p)
}

/// Bucket a legacy pixel height.
pub fn banner_height_for_pixels(px: u64) -> BannerHeight {
    BANNER_HEIGHTS
        .iter()
        .find(|(max, _, _)| px <= *max)
        .map_or(BannerHeight::Full, |(_, bucket, _)| *bucket)
}

/// Canonical pixel height written for a bucket.
pub fn pixels_for_banner_height(height: BannerHeight) -> u64 {
    BANNER_HEIGHTS
        .iter()
        .find(|(_, bucket, _)| *bucket == height)
        .map_or(320, |(_, _, px)| *px)
}

fn legacy_name<T: Copy + PartialEq>(table: &[(&'static str, T)], value: T) -> &'static str {
    table
        .iter()
        .find(|(_, v)| *v == value)
        .map_or("", |(name, _)| *name)
}

// ---------------------------------------------------------------------------
// Row reader
// ---------------------------------------------------------------------------

/// Typed access to one row's bag, producing row-tagged errors.
struct RowReader<'a> {
    row: u32,
    params: &'a Map<String, Value>,
}

impl<'a> RowReader<'a> {
    fn error(&self, reason: impl Into<String>) -> CoreError {
        CoreError::LegacyMapping {
            row: self.row,
            reason: reason.into(),
        }
    }

    /// Absent and `null` both read as `None`.
    fn value(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    fn string(&self, key: &str) -> Result<Option<String>, CoreError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.error(format!("'{key}' must be a string, got {other}"))),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>, CoreError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.error(format!("'{key}' must be a boolean, got {other}"))),
        }
    }

    fn unsigned(&self, key: &str) -> Result<Option<u64>, CoreError> {
        match self.value(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.error(format!("'{key}' must be a non-negative integer, got {v}"))),
        }
    }

    fn small<T: TryFrom<u64>>(&self, key: &str) -> Result<Option<T>, CoreError> {
        match self.unsigned(key)? {
            None => Ok(None),
            Some(n) => T::try_from(n)
                .map(Some)
                .map_err(|_| self.error(format!("'{key}' value {n} is out of range"))),
        }
    }

    fn parsed<T>(&self, key: &str, parse: fn(&str) -> Option<T>) -> Result<Option<T>, CoreError> {
        match self.string(key)? {
            None => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| self.error(format!("unknown {key} '{s}'"))),
        }
    }

    fn table<T: Copy>(&self, key: &str, table: &[(&str, T)]) -> Result<Option<T>, CoreError> {
        match self.string(key)? {
            None => Ok(None),
            Some(s) => table
                .iter()
                .find(|(name, _)| *name == s)
                .map(|(_, v)| Some(*v))
                .ok_or_else(|| self.error(format!("unknown {key} '{s}'"))),
        }
    }

    fn timestamp(&self, key: &str) -> Result<Option<Timestamp>, CoreError> {
        match self.string(key)? {
            None => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| self.error(format!("'{key}' is not an RFC 3339 timestamp: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Legacy -> Block
// ---------------------------------------------------------------------------

/// Map one legacy row onto a block at `position`.
pub fn legacy_to_block(row: &LegacyRow, position: u32) -> Result<Block, CoreError> {
    let reader = RowReader {
        row: position,
        params: &row.params,
    };

    let layout_type = row
        .layout_type
        .as_deref()
        .ok_or_else(|| reader.error("missing layout_type"))?;
    let block_type = block_type_for(layout_type)
        .ok_or_else(|| reader.error(format!("unrecognized layout_type '{layout_type}'")))?;

    let id = match reader.string("id")? {
        Some(s) => Uuid::parse_str(&s).map_err(|e| reader.error(format!("invalid id '{s}': {e}")))?,
        None => legacy_row_id(position),
    };
    let spacing = reader.parsed("spacing", Spacing::from_str)?;

    let data = match block_type {
        BlockType::Text => BlockData::Text(read_text(&reader, spacing)?),
        BlockType::ProductGrid => BlockData::ProductGrid(read_product_grid(&reader, spacing)?),
        BlockType::FeaturedProduct => BlockData::FeaturedProduct(read_featured(&reader)?),
        BlockType::Banner => BlockData::Banner(read_banner(&reader)?),
        BlockType::Masonry => BlockData::Masonry(read_masonry(&reader, spacing)?),
        BlockType::List => BlockData::List(read_list(&reader)?),
    };

    let block = Block {
        id,
        position,
        data,
        spacing,
        background_color: reader.string("bg_color")?,
        text_alignment: reader.parsed("align", TextAlignment::from_str)?,
        created_at: reader.timestamp("created_at")?.unwrap_or_default(),
        updated_at: reader.timestamp("updated_at")?.unwrap_or_default(),
    };

    block.validate().map_err(|e| match e {
        CoreError::InvalidBlockData(reason) => reader.error(reason),
        other => other,
    })?;
    Ok(block)
}

/// Deterministic id for a row written before ids were stored.
pub fn legacy_row_id(row: u32) -> BlockId {
    Uuid::new_v5(&LEGACY_ROW_NAMESPACE, format!("row:{row}").as_bytes())
}

fn read_text(r: &RowReader<'_>, spacing: Option<Spacing>) -> Result<TextData, CoreError> {
    let defaults = TextData::default();
    let padding = match r.parsed("padding", Padding::from_str)? {
        Some(padding) => padding,
        None => spacing.map_or(defaults.padding, padding_for_spacing),
    };
    Ok(TextData {
        content: r.string("content")?.unwrap_or(defaults.content),
        padding,
        width: r
            .parsed("width", ContentWidth::from_str)?
            .unwrap_or(defaults.width),
    })
}

fn read_product_grid(
    r: &RowReader<'_>,
    spacing: Option<Spacing>,
) -> Result<ProductGridData, CoreError> {
    let defaults = ProductGridData::default();
    Ok(ProductGridData {
        columns: r.small("columns")?.unwrap_or(defaults.columns),
        spacing: r
            .parsed("grid_spacing", Spacing::from_str)?
            .or(spacing)
            .unwrap_or(defaults.spacing),
        card_style: r.table("card_type", CARD_TYPES)?.unwrap_or(defaults.card_style),
        sort_order: r
            .parsed("sort", SortOrder::from_str)?
            .unwrap_or(defaults.sort_order),
        show_price: r.boolean("show_price")?.unwrap_or(defaults.show_price),
        show_description: r
            .boolean("show_description")?
            .unwrap_or(defaults.show_description),
        max_products: r.small("product_count")?.unwrap_or(defaults.max_products),
    })
}

fn read_featured(r: &RowReader<'_>) -> Result<FeaturedProductData, CoreError> {
    let defaults = FeaturedProductData::default();
    Ok(FeaturedProductData {
        product_id: r.string("product_id")?,
        image_position: r
            .table("layout", FEATURED_LAYOUTS)?
            .unwrap_or(defaults.image_position),
        show_description: r
            .boolean("show_description")?
            .unwrap_or(defaults.show_description),
        cta_text: r.string("cta_text")?.unwrap_or(defaults.cta_text),
    })
}

fn read_banner(r: &RowReader<'_>) -> Result<BannerData, CoreError> {
    let defaults = BannerData::default();
    Ok(BannerData {
        title: r.string("title")?.unwrap_or(defaults.title),
        subtitle: r.string("subtitle")?.unwrap_or(defaults.subtitle),
        height: r
            .unsigned("height")?
            .map_or(defaults.height, banner_height_for_pixels),
        background: r
            .table("background", BANNER_BACKGROUNDS)?
            .unwrap_or(defaults.background),
        image_url: r.string("image_url")?,
        cta_text: r.string("button_text")?.unwrap_or(defaults.cta_text),
        cta_link: r.string("button_link")?,
    })
}

fn read_masonry(r: &RowReader<'_>, spacing: Option<Spacing>) -> Result<MasonryData, CoreError> {
    let defaults = MasonryData::default();
    let items = match r.value("items") {
        None => defaults.items,
        Some(v) => serde_json::from_value::<Vec<MasonryItem>>(v.clone())
            .map_err(|e| r.error(format!("'items' is malformed: {e}")))?,
    };
    Ok(MasonryData {
        columns: r.small("columns")?.unwrap_or(defaults.columns),
        spacing: r
            .parsed("grid_spacing", Spacing::from_str)?
            .or(spacing)
            .unwrap_or(defaults.spacing),
        items,
    })
}

fn read_list(r: &RowReader<'_>) -> Result<ListData, CoreError> {
    let defaults = ListData::default();
    Ok(ListData {
        max_items: r.small("item_count")?.unwrap_or(defaults.max_items),
        show_price: r.boolean("show_price")?.unwrap_or(defaults.show_price),
        show_image: r.boolean("show_thumbnail")?.unwrap_or(defaults.show_image),
        dividers: r.boolean("dividers")?.unwrap_or(defaults.dividers),
    })
}

// ---------------------------------------------------------------------------
// Block -> Legacy
// ---------------------------------------------------------------------------

/// Flatten a block into a legacy row.
pub fn block_to_legacy(block: &Block) -> LegacyRow {
    let mut p = Map::new();
    p.insert("id".into(), Value::from(block.id.to_string()));
    if let Some(spacing) = block.spacing {
        p.insert("spacing".into(), Value::from(spacing.as_str()));
    }
    if let Some(color) = &block.background_color {
        p.insert("bg_color".into(), Value::from(color.as_str()));
    }
    if let Some(alignment) = block.text_alignment {
        p.insert("align".into(), Value::from(alignment.as_str()));
    }
    p.insert("created_at".into(), Value::from(rfc3339(block.created_at)));
    p.insert("updated_at".into(), Value::from(rfc3339(block.updated_at)));

    match &block.data {
        BlockData::Text(d) => {
            p.insert("content".into(), Value::from(d.content.as_str()));
            p.insert("padding".into(), Value::from(d.padding.as_str()));
            p.insert("width".into(), Value::from(d.width.as_str()));
        }
        BlockData::ProductGrid(d) => {
            p.insert("columns".into(), Value::from(d.columns));
            p.insert("grid_spacing".into(), Value::from(d.spacing.as_str()));
            p.insert("card_type".into(), Value::from(legacy_name(CARD_TYPES, d.card_style)));
            p.insert("sort".into(), Value::from(d.sort_order.as_str()));
            p.insert("show_price".into(), Value::from(d.show_price));
            p.insert("show_description".into(), Value::from(d.show_description));
            p.insert("product_count".into(), Value::from(d.max_products));
        }
        BlockData::FeaturedProduct(d) => {
            if let Some(product_id) = &d.product_id {
                p.insert("product_id".into(), Value::from(product_id.as_str()));
            }
            p.insert(
                "layout".into(),
                Value::from(legacy_name(FEATURED_LAYOUTS, d.image_position)),
            );
            p.insert("show_description".into(), Value::from(d.show_description));
            p.insert("cta_text".into(), Value::from(d.cta_text.as_str()));
        }
        BlockData::Banner(d) => {
            p.insert("title".into(), Value::from(d.title.as_str()));
            p.insert("subtitle".into(), Value::from(d.subtitle.as_str()));
            p.insert("height".into(), Value::from(pixels_for_banner_height(d.height)));
            p.insert(
                "background".into(),
                Value::from(legacy_name(BANNER_BACKGROUNDS, d.background)),
            );
            if let Some(url) = &d.image_url {
                p.insert("image_url".into(), Value::from(url.as_str()));
            }
            p.insert("button_text".into(), Value::from(d.cta_text.as_str()));
            if let Some(link) = &d.cta_link {
                p.insert("button_link".into(), Value::from(link.as_str()));
            }
        }
        BlockData::Masonry(d) => {
            p.insert("columns".into(), Value::from(d.columns));
            p.insert("grid_spacing".into(), Value::from(d.spacing.as_str()));
            p.insert(
                "items".into(),
                serde_json::to_value(&d.items).unwrap_or_else(|_| Value::Array(Vec::new())),
            );
        }
        BlockData::List(d) => {
            p.insert("item_count".into(), Value::from(d.max_items));
            p.insert("show_price".into(), Value::from(d.show_price));
            p.insert("show_thumbnail".into(), Value::from(d.show_image));
            p.insert("dividers".into(), Value::from(d.dividers));
        }
    }

    LegacyRow::new(block.block_type().as_str(), p)
}

fn rfc3339(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// ---------------------------------------------------------------------------
// Whole pages
// ---------------------------------------------------------------------------

/// Map every row of a page, excluding and reporting the ones that fail.
pub fn load_layout(layout: &LegacyLayout) -> LoadedLayout {
    let mut loaded = LoadedLayout::default();
    let mut seen: HashSet<BlockId> = HashSet::new();

    for (&row, legacy) in layout {
        match legacy_to_block(legacy, row) {
            Ok(block) if !seen.insert(block.id) => loaded.errors.push(LegacyMappingError {
                row,
                layout_type: legacy.layout_type.clone(),
                reason: format!("duplicate id {}", block.id),
            }),
            Ok(block) => loaded.blocks.push(block),
            Err(err) => loaded.errors.push(LegacyMappingError {
                row,
                layout_type: legacy.layout_type.clone(),
                reason: match err {
                    CoreError::LegacyMapping { reason, .. } => reason,
                    other => other.to_string(),
                },
            }),
        }
    }

    // BTreeMap iteration is already in row order; close any gaps left by
    // excluded or sparse rows.
    for (index, block) in loaded.blocks.iter_mut().enumerate() {
        block.position = index as u32;
    }
    loaded
}

/// Serialize a page, keyed by position.
pub fn save_layout(blocks: &[Block]) -> LegacyLayout {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|b| b.position);
    ordered
        .into_iter()
        .enumerate()
        .map(|(index, block)| (index as u32, block_to_legacy(block)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 15).unwrap()
    }

    fn row(value: Value) -> LegacyRow {
        serde_json::from_value(value).unwrap()
    }

    fn assert_round_trips(block: Block) {
        let legacy = block_to_legacy(&block);
        let back = legacy_to_block(&legacy, block.position).expect("round trip must map");
        assert_eq!(back, block);
    }

    // -- Round trips ---------------------------------------------------------

    #[test]
    fn text_round_trips() {
        let mut block = Block::new(
            BlockData::Text(TextData {
                content: "<p>Welcome</p>".into(),
                padding: Padding::Large,
                width: ContentWidth::Wide,
            }),
            now(),
        )
        .with_position(2);
        block.text_alignment = Some(TextAlignment::Center);
        assert_round_trips(block.clone());

        block.spacing = Some(Spacing::Tight);
        block.background_color = Some("#fafafa".into());
        assert_round_trips(block);
    }

    #[test]
    fn product_grid_round_trips() {
        let mut block = Block::new(
            BlockData::ProductGrid(ProductGridData {
                columns: 3,
                spacing: Spacing::Loose,
                card_style: CardStyle::Minimal,
                sort_order: SortOrder::PriceDesc,
                show_price: false,
                show_description: true,
                max_products: 12,
            }),
            now(),
        );
        block.spacing = Some(Spacing::None);
        assert_round_trips(block);
    }

    #[test]
    fn featured_banner_list_round_trip() {
        let featured = Block::new(
            BlockData::FeaturedProduct(FeaturedProductData {
                product_id: Some("sku-9".into()),
                image_position: ImagePosition::Right,
                show_description: false,
                cta_text: "Buy".into(),
            }),
            now(),
        );
        assert_round_trips(featured);
        assert_round_trips(Block::featured_product(None, now()));

        let banner = Block::new(
            BlockData::Banner(BannerData {
                title: "Summer".into(),
                subtitle: "Up to 40% off".into(),
                height: BannerHeight::Large,
                background: BannerBackground::Image,
                image_url: Some("https://cdn.example.com/b.jpg".into()),
                cta_text: "Shop".into(),
                cta_link: Some("/collections/summer".into()),
            }),
            now(),
        )
        .with_position(1);
        assert_round_trips(banner);

        let list = Block::new(
            BlockData::List(ListData {
                max_items: 4,
                show_price: false,
                show_image: false,
                dividers: false,
            }),
            now(),
        );
        assert_round_trips(list);
    }

    #[test]
    fn masonry_round_trips_under_its_own_layout_type() {
        let block = Block::new(
            BlockData::Masonry(MasonryData {
                columns: 4,
                spacing: Spacing::Tight,
                items: vec![MasonryItem {
                    image_url: "https://cdn.example.com/1.jpg".into(),
                    caption: Some("Look".into()),
                    link: None,
                }],
            }),
            now(),
        );
        let legacy = block_to_legacy(&block);
        assert_eq!(legacy.layout_type.as_deref(), Some("masonry"));
        assert_round_trips(block);
    }

    // -- Lookup tables -------------------------------------------------------

    #[test]
    fn text_spacing_maps_to_padding() {
        let cases = [
            ("none", Padding::None),
            ("tight", Padding::Small),
            ("normal", Padding::Medium),
            ("loose", Padding::Large),
        ];
        for (spacing, padding) in cases {
            let block = legacy_to_block(
                &row(json!({ "layout_type": "text", "content": "x", "spacing": spacing })),
                0,
            )
            .unwrap();
            let BlockData::Text(text) = &block.data else {
                panic!("expected text");
            };
            assert_eq!(text.padding, padding);
            assert_eq!(block.spacing.map(|s| s.as_str()), Some(spacing));
            // Padding is written back explicitly; the block keeps its spacing.
            let written = block_to_legacy(&block);
            assert_eq!(written.params["padding"], json!(padding.as_str()));
            assert_eq!(written.params["spacing"], json!(spacing));
        }
    }

    #[test]
    fn renamed_grid_keys_are_translated() {
        let block = legacy_to_block(
            &row(json!({
                "layout_type": "grid",
                "columns": 2,
                "spacing": "tight",
                "card_type": "simple",
                "sort": "newest",
                "product_count": 6
            })),
            0,
        )
        .unwrap();
        let BlockData::ProductGrid(grid) = &block.data else {
            panic!("expected grid");
        };
        assert_eq!(grid.columns, 2);
        assert_eq!(grid.spacing, Spacing::Tight, "falls back to row spacing");
        assert_eq!(grid.card_style, CardStyle::Minimal);
        assert_eq!(grid.sort_order, SortOrder::Newest);
        assert_eq!(grid.max_products, 6);
        assert!(grid.show_price, "absent keys take defaults");
    }

    #[test]
    fn banner_pixel_heights_are_bucketed() {
        assert_eq!(banner_height_for_pixels(180), BannerHeight::Small);
        assert_eq!(banner_height_for_pixels(240), BannerHeight::Small);
        assert_eq!(banner_height_for_pixels(300), BannerHeight::Medium);
        assert_eq!(banner_height_for_pixels(500), BannerHeight::Large);
        assert_eq!(banner_height_for_pixels(900), BannerHeight::Full);
        assert_eq!(pixels_for_banner_height(BannerHeight::Medium), 320);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let block = legacy_to_block(&row(json!({ "layout_type": "list" })), 3).unwrap();
        assert_eq!(block.data, BlockData::List(ListData::default()));
        assert_eq!(block.position, 3);
        assert_eq!(block.id, legacy_row_id(3));
        assert_eq!(block.created_at, Timestamp::default());
    }

    // -- Errors --------------------------------------------------------------

    #[test]
    fn unknown_layout_type_is_a_mapping_error() {
        let err = legacy_to_block(&row(json!({ "layout_type": "carousel" })), 4);
        assert_matches!(err, Err(CoreError::LegacyMapping { row: 4, reason }) if reason.contains("carousel"));
    }

    #[test]
    fn missing_layout_type_is_a_mapping_error() {
        let err = legacy_to_block(&row(json!({ "content": "orphan" })), 0);
        assert_matches!(err, Err(CoreError::LegacyMapping { .. }));
    }

    #[test]
    fn out_of_domain_values_are_mapping_errors() {
        let err = legacy_to_block(&row(json!({ "layout_type": "grid", "columns": 12 })), 1);
        assert_matches!(err, Err(CoreError::LegacyMapping { row: 1, .. }));

        let err = legacy_to_block(&row(json!({ "layout_type": "grid", "columns": "3" })), 1);
        assert_matches!(err, Err(CoreError::LegacyMapping { .. }));

        let err = legacy_to_block(&row(json!({ "layout_type": "grid", "card_type": "fancy" })), 1);
        assert_matches!(err, Err(CoreError::LegacyMapping { .. }));
    }

    // -- Whole pages ---------------------------------------------------------

    #[test]
    fn bad_rows_are_excluded_without_blocking_the_rest() {
        let mut layout = LegacyLayout::new();
        layout.insert(0, row(json!({ "layout_type": "text", "content": "a" })));
        layout.insert(1, row(json!({ "layout_type": "hologram" })));
        layout.insert(5, row(json!({ "layout_type": "banner", "title": "b" })));

        let loaded = load_layout(&layout);
        assert!(!loaded.is_complete());
        assert_eq!(loaded.errors.len(), 1);
        assert_eq!(loaded.errors[0].row, 1);
        assert_eq!(loaded.errors[0].layout_type.as_deref(), Some("hologram"));

        let positions: Vec<u32> = loaded.blocks.iter().map(|b| b.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(loaded.blocks[1].block_type(), BlockType::Banner);
    }

    #[test]
    fn repeated_ids_keep_the_first_row_only() {
        let id = Uuid::new_v4().to_string();
        let mut layout = LegacyLayout::new();
        layout.insert(0, row(json!({ "layout_type": "text", "id": id, "content": "first" })));
        layout.insert(1, row(json!({ "layout_type": "banner", "id": id, "title": "copy" })));
        layout.insert(2, row(json!({ "layout_type": "list" })));

        let loaded = load_layout(&layout);
        assert_eq!(loaded.blocks.len(), 2);
        assert_eq!(loaded.errors.len(), 1);
        assert_eq!(loaded.errors[0].row, 1);
        assert!(loaded.errors[0].reason.starts_with("duplicate id"));
        assert_matches!(&loaded.blocks[0].data, BlockData::Text(t) if t.content == "first");

        let mut state = crate::editor::EditorState::default();
        state
            .apply(crate::editor::EditorAction::LoadInitialBlocks(loaded.blocks), now())
            .unwrap();
        assert_eq!(state.blocks.len(), 2);
    }

    #[test]
    fn save_layout_keys_rows_by_position() {
        let a = Block::text("a", now()).with_position(1);
        let b = Block::list(now()).with_position(0);
        let layout = save_layout(&[a.clone(), b.clone()]);

        assert_eq!(layout.len(), 2);
        assert_eq!(layout[&0].layout_type.as_deref(), Some("list"));
        assert_eq!(layout[&1].params["id"], json!(a.id.to_string()));

        let loaded = load_layout(&layout);
        assert!(loaded.is_complete());
        assert_eq!(loaded.blocks, vec![b, a]);
    }

    #[test]
    fn legacy_layout_serializes_with_string_row_keys() {
        let layout = save_layout(&[Block::text("hello", now())]);
        let value = serde_json::to_value(&layout).unwrap();
        assert_eq!(value["0"]["layout_type"], "text");
        assert_eq!(value["0"]["content"], "hello");

        let back: LegacyLayout = serde_json::from_value(value).unwrap();
        assert_eq!(back, layout);
    }
}
