//! Block model: the typed union of page content blocks.
//!
//! Every block carries one variant-specific parameter record ([`BlockData`])
//! plus three optional cross-variant presentation overrides. Records are
//! closed (unknown keys are rejected) and validated on every write through
//! [`Block::validate`], so a malformed block never enters an editor session.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::CoreError;
use crate::product::Product;
use crate::types::{BlockId, Timestamp};

// ---------------------------------------------------------------------------
// String-backed enums
// ---------------------------------------------------------------------------

/// Declares a `snake_case` wire enum with `as_str`, `from_str`, `ALL` and
/// `Display`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Return the wire name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }

            /// Parse a wire name. Returns `None` for unknown values.
            pub fn from_str(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// All valid wire names.
            pub const ALL: &'static [&'static str] = &[$($wire),+];
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// The closed set of block variants.
    pub enum BlockType {
        Text => "text",
        ProductGrid => "product_grid",
        FeaturedProduct => "featured_product",
        Banner => "banner",
        Masonry => "masonry",
        List => "list",
    }
}

string_enum! {
    /// Spacing scale shared by block margins and grid gaps.
    pub enum Spacing {
        None => "none",
        Tight => "tight",
        Normal => "normal",
        Loose => "loose",
    }
}

string_enum! {
    /// Inner padding of a text block.
    pub enum Padding {
        None => "none",
        Small => "small",
        Medium => "medium",
        Large => "large",
    }
}

string_enum! {
    /// Maximum line width of a text block.
    pub enum ContentWidth {
        Narrow => "narrow",
        Medium => "medium",
        Wide => "wide",
        Full => "full",
    }
}

string_enum! {
    pub enum TextAlignment {
        Left => "left",
        Center => "center",
        Right => "right",
    }
}

string_enum! {
    /// Product card presentation inside a grid.
    pub enum CardStyle {
        Minimal => "minimal",
        Standard => "standard",
        Detailed => "detailed",
        Overlay => "overlay",
    }
}

string_enum! {
    pub enum SortOrder {
        Featured => "featured",
        Newest => "newest",
        PriceAsc => "price_asc",
        PriceDesc => "price_desc",
        Name => "name",
    }
}

string_enum! {
    /// Side of a featured product block the image sits on.
    pub enum ImagePosition {
        Left => "left",
        Right => "right",
    }
}

string_enum! {
    pub enum BannerHeight {
        Small => "small",
        Medium => "medium",
        Large => "large",
        Full => "full",
    }
}

string_enum! {
    pub enum BannerBackground {
        Solid => "solid",
        Gradient => "gradient",
        Image => "image",
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self::Normal
    }
}

impl Default for Padding {
    fn default() -> Self {
        Self::Medium
    }
}

impl Default for ContentWidth {
    fn default() -> Self {
        Self::Medium
    }
}

impl Default for CardStyle {
    fn default() -> Self {
        Self::Standard
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Featured
    }
}

impl Default for ImagePosition {
    fn default() -> Self {
        Self::Left
    }
}

impl Default for BannerHeight {
    fn default() -> Self {
        Self::Medium
    }
}

impl Default for BannerBackground {
    fn default() -> Self {
        Self::Solid
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a text block's content.
pub const MAX_TEXT_LENGTH: u64 = 50_000;

/// Maximum number of tiles in a masonry block.
pub const MAX_MASONRY_ITEMS: u64 = 50;

/// Default call-to-action label of a featured product.
pub const DEFAULT_FEATURED_CTA: &str = "Shop now";

/// Accepts `#rgb` and `#rrggbb`.
static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("hex color pattern is valid")
});

// ---------------------------------------------------------------------------
// Variant parameter records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct TextData {
    #[validate(length(max = MAX_TEXT_LENGTH))]
    pub content: String,
    pub padding: Padding,
    pub width: ContentWidth,
}

impl Default for TextData {
    fn default() -> Self {
        Self {
            content: String::new(),
            padding: Padding::Medium,
            width: ContentWidth::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ProductGridData {
    #[validate(range(min = 1, max = 8))]
    pub columns: u8,
    pub spacing: Spacing,
    pub card_style: CardStyle,
    pub sort_order: SortOrder,
    pub show_price: bool,
    pub show_description: bool,
    #[validate(range(min = 1, max = 100))]
    pub max_products: u32,
}

impl Default for ProductGridData {
    fn default() -> Self {
        Self {
            columns: 4,
            spacing: Spacing::Normal,
            card_style: CardStyle::Standard,
            sort_order: SortOrder::Featured,
            show_price: true,
            show_description: true,
            max_products: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct FeaturedProductData {
    #[validate(length(min = 1, max = 128))]
    pub product_id: Option<String>,
    pub image_position: ImagePosition,
    pub show_description: bool,
    #[validate(length(max = 60))]
    pub cta_text: String,
}

impl Default for FeaturedProductData {
    fn default() -> Self {
        Self {
            product_id: None,
            image_position: ImagePosition::Left,
            show_description: true,
            cta_text: DEFAULT_FEATURED_CTA.to_string(),
        }
    }
}

impl FeaturedProductData {
    /// Defaults that feature the first product of the catalog, if any.
    pub fn for_catalog(products: &[Product]) -> Self {
        Self {
            product_id: products.first().map(|p| p.id.clone()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct BannerData {
    #[validate(length(max = 200))]
    pub title: String,
    #[validate(length(max = 300))]
    pub subtitle: String,
    pub height: BannerHeight,
    pub background: BannerBackground,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(length(max = 60))]
    pub cta_text: String,
    #[validate(length(max = 2048))]
    pub cta_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct MasonryItem {
    #[validate(url)]
    pub image_url: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub caption: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2048))]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct MasonryData {
    #[validate(range(min = 2, max = 6))]
    pub columns: u8,
    pub spacing: Spacing,
    #[validate(length(max = MAX_MASONRY_ITEMS))]
    pub items: Vec<MasonryItem>,
}

impl Default for MasonryData {
    fn default() -> Self {
        Self {
            columns: 3,
            spacing: Spacing::Normal,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ListData {
    #[validate(range(min = 1, max = 100))]
    pub max_items: u32,
    pub show_price: bool,
    pub show_image: bool,
    pub dividers: bool,
}

impl Default for ListData {
    fn default() -> Self {
        Self {
            max_items: 10,
            show_price: true,
            show_image: true,
            dividers: true,
        }
    }
}

// ---------------------------------------------------------------------------
// BlockData
// ---------------------------------------------------------------------------

/// Variant-specific parameters. The variant *is* the block's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum BlockData {
    Text(TextData),
    ProductGrid(ProductGridData),
    FeaturedProduct(FeaturedProductData),
    Banner(BannerData),
    Masonry(MasonryData),
    List(ListData),
}

impl BlockData {
    /// The defaults for a given variant.
    pub fn default_for(block_type: BlockType) -> Self {
        match block_type {
            BlockType::Text => Self::Text(TextData::default()),
            BlockType::ProductGrid => Self::ProductGrid(ProductGridData::default()),
            BlockType::FeaturedProduct => Self::FeaturedProduct(FeaturedProductData::default()),
            BlockType::Banner => Self::Banner(BannerData::default()),
            BlockType::Masonry => Self::Masonry(MasonryData::default()),
            BlockType::List => Self::List(ListData::default()),
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Text(_) => BlockType::Text,
            Self::ProductGrid(_) => BlockType::ProductGrid,
            Self::FeaturedProduct(_) => BlockType::FeaturedProduct,
            Self::Banner(_) => BlockType::Banner,
            Self::Masonry(_) => BlockType::Masonry,
            Self::List(_) => BlockType::List,
        }
    }

    /// Build a variant from a JSON parameter object.
    ///
    /// Absent keys take the variant's defaults; unknown keys and values of the
    /// wrong shape are rejected. The result is validated.
    pub fn from_params(block_type: BlockType, params: Value) -> Result<Self, CoreError> {
        let data = match block_type {
            BlockType::Text => serde_json::from_value(params).map(Self::Text),
            BlockType::ProductGrid => serde_json::from_value(params).map(Self::ProductGrid),
            BlockType::FeaturedProduct => {
                serde_json::from_value(params).map(Self::FeaturedProduct)
            }
            BlockType::Banner => serde_json::from_value(params).map(Self::Banner),
            BlockType::Masonry => serde_json::from_value(params).map(Self::Masonry),
            BlockType::List => serde_json::from_value(params).map(Self::List),
        }
        .map_err(|e| CoreError::InvalidBlockData(format!("{block_type}: {e}")))?;

        data.validate()?;
        Ok(data)
    }

    /// The parameter record as a JSON object.
    pub fn params(&self) -> Map<String, Value> {
        let value = match self {
            Self::Text(d) => serde_json::to_value(d),
            Self::ProductGrid(d) => serde_json::to_value(d),
            Self::FeaturedProduct(d) => serde_json::to_value(d),
            Self::Banner(d) => serde_json::to_value(d),
            Self::Masonry(d) => serde_json::to_value(d),
            Self::List(d) => serde_json::to_value(d),
        };
        match value {
            Ok(Value::Object(map)) => map,
            // Plain records of strings, numbers and bools always serialize to objects.
            _ => Map::new(),
        }
    }

    /// Merge `fields` over the current parameters, key by key.
    pub fn merged(&self, fields: &Map<String, Value>) -> Result<Self, CoreError> {
        let mut params = self.params();
        for (key, value) in fields {
            params.insert(key.clone(), value.clone());
        }
        Self::from_params(self.block_type(), Value::Object(params))
    }

    /// Check every field of the record against its declared domain.
    pub fn validate(&self) -> Result<(), CoreError> {
        let result = match self {
            Self::Text(d) => d.validate(),
            Self::ProductGrid(d) => d.validate(),
            Self::FeaturedProduct(d) => d.validate(),
            Self::Banner(d) => d.validate(),
            Self::Masonry(d) => d.validate().and_then(|()| {
                d.items.iter().try_for_each(|item| item.validate())
            }),
            Self::List(d) => d.validate(),
        };
        result.map_err(|e| CoreError::InvalidBlockData(format!("{}: {e}", self.block_type())))
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// The atomic unit of page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Zero-based index within the page.
    pub position: u32,
    pub data: BlockData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<Spacing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Block {
    /// Create a block with a fresh id at position 0.
    pub fn new(data: BlockData, now: Timestamp) -> Self {
        Self {
            id: BlockId::new_v4(),
            position: 0,
            data,
            spacing: None,
            background_color: None,
            text_alignment: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A block of the given variant with all defaults.
    pub fn of_type(block_type: BlockType, now: Timestamp) -> Self {
        Self::new(BlockData::default_for(block_type), now)
    }

    pub fn text(content: impl Into<String>, now: Timestamp) -> Self {
        Self::new(
            BlockData::Text(TextData {
                content: content.into(),
                ..TextData::default()
            }),
            now,
        )
    }

    pub fn product_grid(now: Timestamp) -> Self {
        Self::of_type(BlockType::ProductGrid, now)
    }

    pub fn featured_product(product_id: Option<String>, now: Timestamp) -> Self {
        Self::new(
            BlockData::FeaturedProduct(FeaturedProductData {
                product_id,
                ..FeaturedProductData::default()
            }),
            now,
        )
    }

    pub fn banner(title: impl Into<String>, now: Timestamp) -> Self {
        Self::new(
            BlockData::Banner(BannerData {
                title: title.into(),
                ..BannerData::default()
            }),
            now,
        )
    }

    pub fn masonry(now: Timestamp) -> Self {
        Self::of_type(BlockType::Masonry, now)
    }

    pub fn list(now: Timestamp) -> Self {
        Self::of_type(BlockType::List, now)
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    pub fn block_type(&self) -> BlockType {
        self.data.block_type()
    }

    /// A block is well-formed iff its record and overrides are in domain.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.data.validate()?;
        if let Some(color) = &self.background_color {
            validate_hex_color(color)?;
        }
        Ok(())
    }
}

/// Validate a `#rgb` / `#rrggbb` color string.
pub fn validate_hex_color(color: &str) -> Result<(), CoreError> {
    if HEX_COLOR.is_match(color) {
        Ok(())
    } else {
        Err(CoreError::InvalidBlockData(format!(
            "background_color '{color}' must be #rgb or #rrggbb"
        )))
    }
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// A partial update to one block.
///
/// `data` keys are merged into the variant record. The overrides use a
/// double `Option`: absent leaves the value alone, `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub spacing: Option<Option<Spacing>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub background_color: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub text_alignment: Option<Option<TextAlignment>>,
}

impl BlockPatch {
    /// Patch that only touches variant parameters.
    pub fn data(fields: Map<String, Value>) -> Self {
        Self {
            data: Some(fields),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.as_ref().map_or(true, Map::is_empty)
            && self.spacing.is_none()
            && self.background_color.is_none()
            && self.text_alignment.is_none()
    }

    /// Fold a later patch over this one; later keys win.
    pub fn merge(&mut self, later: &BlockPatch) {
        if let Some(fields) = &later.data {
            let data = self.data.get_or_insert_with(Map::new);
            for (key, value) in fields {
                data.insert(key.clone(), value.clone());
            }
        }
        if later.spacing.is_some() {
            self.spacing = later.spacing;
        }
        if later.background_color.is_some() {
            self.background_color = later.background_color.clone();
        }
        if later.text_alignment.is_some() {
            self.text_alignment = later.text_alignment;
        }
    }

    /// Produce the patched block, validated and stamped with `now`.
    ///
    /// Never changes the block's id, position or variant.
    pub fn apply(&self, block: &Block, now: Timestamp) -> Result<Block, CoreError> {
        let mut next = block.clone();
        if let Some(fields) = &self.data {
            next.data = block.data.merged(fields)?;
        }
        if let Some(spacing) = self.spacing {
            next.spacing = spacing;
        }
        if let Some(color) = &self.background_color {
            next.background_color = color.clone();
        }
        if let Some(alignment) = self.text_alignment {
            next.text_alignment = alignment;
        }
        next.validate()?;
        next.updated_at = now;
        Ok(next)
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
