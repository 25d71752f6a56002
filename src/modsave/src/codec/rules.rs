//! Built-in conversion rules for opaque engine values.
//!
//! The engine's own types (screen rectangles, textures, polymorphic items)
//! cannot be serialized structurally, so the store works with stand-in
//! handles and rewrites them into compact, stable string forms on disk:
//!
//! - [`Rect`] -> `"x,y,w,h"` flat tuple string
//! - [`TextureHandle`] -> the asset path string
//! - [`ItemHandle`] -> `"<type>|GUID=<guid>"` reference string

use super::{CodecError, ConvertRule};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A screen-space rectangle, the stand-in for the engine's rectangle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// Reference to a texture asset by path. The pixel data itself never goes
/// into save files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureHandle {
    pub asset_path: String,
}

impl TextureHandle {
    pub fn new(asset_path: impl Into<String>) -> Self {
        TextureHandle {
            asset_path: asset_path.into(),
        }
    }
}

/// Reference to a mod-owned item stored elsewhere in the save tree.
///
/// The item itself lives in its own object file; inventories only hold this
/// `(type tag, guid)` pair so polymorphic items survive serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemHandle {
    pub type_tag: String,
    pub guid: String,
}

impl ItemHandle {
    pub fn new(type_tag: impl Into<String>, guid: impl Into<String>) -> Self {
        ItemHandle {
            type_tag: type_tag.into(),
            guid: guid.into(),
        }
    }
}

/// Rule flattening [`Rect`] values to `"x,y,w,h"` strings.
pub fn rectangle() -> ConvertRule {
    ConvertRule {
        tag: "rect",
        matches: |value| {
            value.as_object().is_some_and(|map| {
                map.len() == 4
                    && ["x", "y", "width", "height"]
                        .iter()
                        .all(|field| map.get(*field).is_some_and(Value::is_i64))
            })
        },
        encode: |value| {
            let field = |name| value.get(name).and_then(Value::as_i64).unwrap_or_default();
            Ok(Value::String(format!(
                "{},{},{},{}",
                field("x"),
                field("y"),
                field("width"),
                field("height")
            )))
        },
        decode: |value| {
            let text = value.as_str().ok_or_else(|| CodecError::InvalidConversion {
                tag: "rect",
                reason: format!("expected a string, got {value}"),
            })?;
            let fields: Vec<i64> = text
                .split(',')
                .map(|part| part.trim().parse::<i64>())
                .collect::<Result<_, _>>()
                .map_err(|err| CodecError::InvalidConversion {
                    tag: "rect",
                    reason: format!("`{text}`: {err}"),
                })?;
            let [x, y, width, height] = fields[..] else {
                return Err(CodecError::InvalidConversion {
                    tag: "rect",
                    reason: format!("`{text}`: expected 4 fields, got {}", fields.len()),
                });
            };
            Ok(serde_json::json!({
                "x": x,
                "y": y,
                "width": width,
                "height": height,
            }))
        },
    }
}

/// Rule storing [`TextureHandle`] values as their asset path string.
pub fn texture() -> ConvertRule {
    ConvertRule {
        tag: "texture",
        matches: |value| {
            value
                .as_object()
                .is_some_and(|map| map.len() == 1 && map.get("asset_path").is_some_and(Value::is_string))
        },
        encode: |value| {
            Ok(value
                .get("asset_path")
                .cloned()
                .unwrap_or(Value::Null))
        },
        decode: |value| {
            if !value.is_string() {
                return Err(CodecError::InvalidConversion {
                    tag: "texture",
                    reason: format!("expected an asset path string, got {value}"),
                });
            }
            Ok(serde_json::json!({ "asset_path": value }))
        },
    }
}

/// Rule storing [`ItemHandle`] values as `"<type>|GUID=<guid>"` strings.
pub fn item_handle() -> ConvertRule {
    ConvertRule {
        tag: "item",
        matches: |value| {
            value.as_object().is_some_and(|map| {
                map.len() == 2
                    && map.get("type_tag").is_some_and(Value::is_string)
                    && map.get("guid").is_some_and(Value::is_string)
            })
        },
        encode: |value| {
            let field = |name| value.get(name).and_then(Value::as_str).unwrap_or_default();
            Ok(Value::String(format!(
                "{}|GUID={}",
                field("type_tag"),
                field("guid")
            )))
        },
        decode: |value| {
            let text = value.as_str().ok_or_else(|| CodecError::InvalidConversion {
                tag: "item",
                reason: format!("expected a reference string, got {value}"),
            })?;
            let (type_tag, guid) = text
                .split_once("|GUID=")
                .ok_or_else(|| CodecError::InvalidConversion {
                    tag: "item",
                    reason: format!("`{text}` is missing the `|GUID=` separator"),
                })?;
            Ok(serde_json::json!({
                "type_tag": type_tag,
                "guid": guid,
            }))
        },
    }
}
