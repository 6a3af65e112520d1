//! Renderer adapter: maps blocks to presentational layout parameters.
//!
//! Stateless. The read-only view and the editor preview share [`layout_block`]
//! so a shopper sees exactly the layout a saved session produced.

use serde::Serialize;

use crate::block::{
    BannerBackground, Block, BlockData, BlockType, CardStyle, ContentWidth, ImagePosition,
    MasonryItem, Padding, SortOrder, Spacing, TextAlignment,
};
use crate::editor::EditorState;
use crate::legacy::pixels_for_banner_height;
use crate::product::Product;
use crate::types::BlockId;

// ---------------------------------------------------------------------------
// Layout types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerStyle {
    pub margin_px: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutBody {
    Text {
        content: String,
        padding_px: u32,
        /// `None` spans the full width.
        max_width_px: Option<u32>,
    },
    ProductGrid {
        columns: u8,
        grid_template: String,
        gap_px: u32,
        card_style: CardStyle,
        show_price: bool,
        show_description: bool,
        products: Vec<Product>,
    },
    FeaturedProduct {
        product: Option<Product>,
        image_position: ImagePosition,
        show_description: bool,
        cta_text: String,
    },
    Banner {
        title: String,
        subtitle: String,
        height_px: u64,
        background: BannerBackground,
        image_url: Option<String>,
        cta_text: String,
        cta_link: Option<String>,
    },
    Masonry {
        grid_template: String,
        gap_px: u32,
        /// Items distributed round-robin, one vector per column.
        columns: Vec<Vec<MasonryItem>>,
    },
    List {
        products: Vec<Product>,
        show_price: bool,
        show_image: bool,
        dividers: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockLayout {
    pub block_id: BlockId,
    pub block_type: BlockType,
    pub position: u32,
    pub container: ContainerStyle,
    pub body: LayoutBody,
}

/// Editor-only decorations around a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EditChrome {
    pub selected: bool,
    pub editing: bool,
    pub dragging: bool,
    /// The insertion indicator sits just before this block.
    pub drop_indicator_before: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditableLayout {
    #[serde(flatten)]
    pub layout: BlockLayout,
    pub chrome: EditChrome,
}

// ---------------------------------------------------------------------------
// Lookup tables
// ---------------------------------------------------------------------------

pub fn gap_px(spacing: Spacing) -> u32 {
    match spacing {
        Spacing::None => 0,
        Spacing::Tight => 8,
        Spacing::Normal => 16,
        Spacing::Loose => 32,
    }
}

pub fn padding_px(padding: Padding) -> u32 {
    match padding {
        Padding::None => 0,
        Padding::Small => 8,
        Padding::Medium => 16,
        Padding::Large => 32,
    }
}

pub fn max_width_px(width: ContentWidth) -> Option<u32> {
    match width {
        ContentWidth::Narrow => Some(480),
        ContentWidth::Medium => Some(720),
        ContentWidth::Wide => Some(960),
        ContentWidth::Full => None,
    }
}

pub fn grid_template(columns: u8) -> String {
    format!("repeat({columns}, minmax(0, 1fr))")
}

// ---------------------------------------------------------------------------
// Product cursor
// ---------------------------------------------------------------------------

/// Running offset into the catalog so product blocks on one page never
/// show the same product twice.
#[derive(Debug, Clone)]
pub struct ProductCursor<'a> {
    products: &'a [Product],
    next: usize,
}

impl<'a> ProductCursor<'a> {
    pub fn new(products: &'a [Product]) -> Self {
        Self { products, next: 0 }
    }

    /// Take up to `limit` products and advance past them.
    pub fn take(&mut self, limit: usize) -> &'a [Product] {
        let start = self.next.min(self.products.len());
        let end = start.saturating_add(limit).min(self.products.len());
        self.next = end;
        &self.products[start..end]
    }

    pub fn consumed(&self) -> usize {
        self.next
    }
}

fn sorted(products: &[Product], order: SortOrder) -> Vec<Product> {
    let mut out = products.to_vec();
    match order {
        SortOrder::Featured => {}
        SortOrder::Newest => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::PriceAsc => out.sort_by_key(|p| p.price_cents),
        SortOrder::PriceDesc => out.sort_by(|a, b| b.price_cents.cmp(&a.price_cents)),
        SortOrder::Name => out.sort_by(|a, b| a.name.cmp(&b.name)),
    }
    out
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Lay out one block, consuming catalog products through `cursor`.
pub fn layout_block(block: &Block, catalog: &[Product], cursor: &mut ProductCursor<'_>) -> BlockLayout {
    let body = match &block.data {
        BlockData::Text(d) => LayoutBody::Text {
            content: d.content.clone(),
            padding_px: padding_px(d.padding),
            max_width_px: max_width_px(d.width),
        },
        BlockData::ProductGrid(d) => LayoutBody::ProductGrid {
            columns: d.columns,
            grid_template: grid_template(d.columns),
            gap_px: gap_px(d.spacing),
            card_style: d.card_style,
            show_price: d.show_price,
            show_description: d.show_description,
            products: sorted(cursor.take(d.max_products as usize), d.sort_order),
        },
        BlockData::FeaturedProduct(d) => LayoutBody::FeaturedProduct {
            product: d
                .product_id
                .as_deref()
                .and_then(|id| catalog.iter().find(|p| p.id == id))
                .cloned(),
            image_position: d.image_position,
            show_description: d.show_description,
            cta_text: d.cta_text.clone(),
        },
        BlockData::Banner(d) => LayoutBody::Banner {
            title: d.title.clone(),
            subtitle: d.subtitle.clone(),
            height_px: pixels_for_banner_height(d.height),
            background: d.background,
            image_url: d.image_url.clone(),
            cta_text: d.cta_text.clone(),
            cta_link: d.cta_link.clone(),
        },
        BlockData::Masonry(d) => {
            let mut columns = vec![Vec::new(); usize::from(d.columns.max(1))];
            let count = columns.len();
            for (i, item) in d.items.iter().enumerate() {
                columns[i % count].push(item.clone());
            }
            LayoutBody::Masonry {
                grid_template: grid_template(d.columns),
                gap_px: gap_px(d.spacing),
                columns,
            }
        }
        BlockData::List(d) => LayoutBody::List {
            products: cursor.take(d.max_items as usize).to_vec(),
            show_price: d.show_price,
            show_image: d.show_image,
            dividers: d.dividers,
        },
    };

    BlockLayout {
        block_id: block.id,
        block_type: block.block_type(),
        position: block.position,
        container: ContainerStyle {
            margin_px: gap_px(block.spacing.unwrap_or_default()),
            background_color: block.background_color.clone(),
            text_alignment: block.text_alignment,
        },
        body,
    }
}

/// Read-only layouts for a page, in position order.
pub fn render_page(blocks: &[Block], catalog: &[Product]) -> Vec<BlockLayout> {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|b| b.position);

    let mut cursor = ProductCursor::new(catalog);
    ordered
        .into_iter()
        .map(|block| layout_block(block, catalog, &mut cursor))
        .collect()
}

/// Live preview with editing chrome.
pub fn render_editor(state: &EditorState, catalog: &[Product]) -> Vec<EditableLayout> {
    let drop_at = state
        .drag
        .is_dragging
        .then_some(state.drag.drag_over_index)
        .flatten();

    render_page(&state.blocks, catalog)
        .into_iter()
        .enumerate()
        .map(|(index, layout)| {
            let id = layout.block_id;
            EditableLayout {
                chrome: EditChrome {
                    selected: state.selected_block_id == Some(id),
                    editing: state.editing_block_id == Some(id),
                    dragging: state.drag.dragged_block_id == Some(id),
                    drop_indicator_before: drop_at == Some(index),
                },
                layout,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
