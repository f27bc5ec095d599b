use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StudioError;

/// Identity of a decoded raster; histogram caching is keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `x` is the input intensity, `y` the mapped output intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlPoint {
    pub x: u8,
    pub y: u8,
}

impl ControlPoint {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

/// Control points sorted by strictly increasing `x`, always anchored at
/// `x = 0` and `x = 255`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<ControlPoint>", into = "Vec<ControlPoint>")]
pub struct ChannelCurve {
    pub(crate) points: Vec<ControlPoint>,
}

impl ChannelCurve {
    pub fn new(points: Vec<ControlPoint>) -> Result<Self, StudioError> {
        if points.len() < 2 {
            return Err(StudioError::InvalidCurve(format!(
                "a curve needs at least 2 points, got {}",
                points.len()
            )));
        }
        if points[0].x != 0 {
            return Err(StudioError::InvalidCurve(format!(
                "first point must sit at x=0, found x={}",
                points[0].x
            )));
        }
        let last = points[points.len() - 1];
        if last.x != 255 {
            return Err(StudioError::InvalidCurve(format!(
                "last point must sit at x=255, found x={}",
                last.x
            )));
        }
        if let Some(pair) = points.windows(2).find(|pair| pair[0].x >= pair[1].x) {
            return Err(StudioError::InvalidCurve(format!(
                "x values must strictly increase ({} then {})",
                pair[0].x, pair[1].x
            )));
        }
        Ok(Self { points })
    }

    pub fn identity() -> Self {
        Self {
            points: vec![ControlPoint::new(0, 0), ControlPoint::new(255, 255)],
        }
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    pub fn is_identity(&self) -> bool {
        self.points.iter().all(|p| p.x == p.y)
    }

    /// Inserts an interior point, returning its index.
    pub fn insert_point(&mut self, point: ControlPoint) -> Result<usize, StudioError> {
        if point.x == 0 || point.x == 255 {
            return Err(StudioError::InvalidCurve(format!(
                "x={} is reserved for a boundary point",
                point.x
            )));
        }
        match self.points.binary_search_by_key(&point.x, |p| p.x) {
            Ok(_) => Err(StudioError::InvalidCurve(format!(
                "a point already exists at x={}",
                point.x
            ))),
            Err(index) => {
                self.points.insert(index, point);
                Ok(index)
            }
        }
    }

    pub fn remove_point(&mut self, index: usize) -> Result<ControlPoint, StudioError> {
        if index == 0 || index + 1 >= self.points.len() {
            return Err(StudioError::InvalidCurve(format!(
                "point {index} is a boundary point or out of range"
            )));
        }
        Ok(self.points.remove(index))
    }

    /// Moves a point, keeping `x` strictly between its neighbours. Boundary
    /// points only change `y`. Returns `false` for an unknown index.
    pub fn move_point(&mut self, index: usize, x: u8, y: u8) -> bool {
        let last = self.points.len() - 1;
        if index > last {
            return false;
        }
        let x = if index == 0 || index == last {
            self.points[index].x
        } else {
            let lo = self.points[index - 1].x + 1;
            let hi = self.points[index + 1].x - 1;
            x.clamp(lo, hi)
        };
        self.points[index] = ControlPoint::new(x, y);
        true
    }
}

impl Default for ChannelCurve {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<Vec<ControlPoint>> for ChannelCurve {
    type Error = StudioError;

    fn try_from(points: Vec<ControlPoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<ChannelCurve> for Vec<ControlPoint> {
    fn from(curve: ChannelCurve) -> Self {
        curve.points
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    All,
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::All, Channel::Red, Channel::Green, Channel::Blue];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Linear,
    /// Monotone cubic Hermite through the same control points.
    Smooth,
}

/// Per-channel tone curves. `all` is applied before the colour channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CurveSettings {
    pub all: ChannelCurve,
    pub red: ChannelCurve,
    pub green: ChannelCurve,
    pub blue: ChannelCurve,
    pub interpolation: Interpolation,
}

impl CurveSettings {
    pub fn curve(&self, channel: Channel) -> &ChannelCurve {
        match channel {
            Channel::All => &self.all,
            Channel::Red => &self.red,
            Channel::Green => &self.green,
            Channel::Blue => &self.blue,
        }
    }

    pub fn curve_mut(&mut self, channel: Channel) -> &mut ChannelCurve {
        match channel {
            Channel::All => &mut self.all,
            Channel::Red => &mut self.red,
            Channel::Green => &mut self.green,
            Channel::Blue => &mut self.blue,
        }
    }

    pub fn is_identity(&self) -> bool {
        Channel::ALL.iter().all(|c| self.curve(*c).is_identity())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewportState {
    pub zoom: f64,
    pub rotation_deg: f64,
    pub pan_offset: Offset,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            rotation_deg: 0.0,
            pan_offset: Offset::ZERO,
        }
    }
}

/// Source-pixel rectangle to extract, in the (possibly rotated) source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub rotation_deg: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    White,
    Blue,
    #[default]
    Unchanged,
}

impl FromStr for Background {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(Background::White),
            "blue" => Ok(Background::Blue),
            "unchanged" | "none" => Ok(Background::Unchanged),
            other => Err(format!("unknown background '{other}' (white, blue, unchanged)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Clothing {
    #[default]
    None,
    BlazerBlack,
    BlazerNavy,
    ShirtWhite,
    ShirtLightBlue,
}

impl FromStr for Clothing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Clothing::None),
            "blazer-black" => Ok(Clothing::BlazerBlack),
            "blazer-navy" => Ok(Clothing::BlazerNavy),
            "shirt-white" => Ok(Clothing::ShirtWhite),
            "shirt-light-blue" => Ok(Clothing::ShirtLightBlue),
            other => Err(format!(
                "unknown clothing '{other}' (none, blazer-black, blazer-navy, shirt-white, shirt-light-blue)"
            )),
        }
    }
}
