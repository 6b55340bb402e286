// rust/streaming-vision/src/value.rs

//! Column values carried by stored samples.
//!
//! A shard record maps column names to [`Value`]s. Vision datasets usually
//! store a decoded [`Image`] as the input and an integer class as the target;
//! [`to_tensor`] turns the image into the channel-first float [`Tensor`] that
//! training code consumes.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamingError};

/// Pixel layout of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// 8-bit grayscale.
    L,
    Rgb,
    Rgba,
}

impl ColorMode {
    /// Number of interleaved channels per pixel.
    pub fn channels(&self) -> usize {
        match self {
            Self::L => 1,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// A decoded image with interleaved (height, width, channel) `u8` pixels.
///
/// The pixel buffer always matches the dimensions, including for images
/// decoded from a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawImage")]
pub struct Image {
    width: u32,
    height: u32,
    mode: ColorMode,
    pixels: Vec<u8>,
}

impl Image {
    /// Creates an image, checking that `pixels` matches the dimensions.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the buffer length is not
    /// `width * height * channels`.
    pub fn new(width: u32, height: u32, mode: ColorMode, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(mode.channels()));
        if expected != Some(pixels.len()) {
            let expected = width as u128 * height as u128 * mode.channels() as u128;
            return Err(StreamingError::decode(format!(
                "{width}x{height} {mode:?} image needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            mode,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel channels at (`x`, `y`), or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.mode.channels();
        let start = (y as usize * self.width as usize + x as usize) * channels;
        Some(&self.pixels[start..start + channels])
    }
}

/// Unchecked wire form of [`Image`].
#[derive(Deserialize)]
struct RawImage {
    width: u32,
    height: u32,
    mode: ColorMode,
    pixels: Vec<u8>,
}

impl TryFrom<RawImage> for Image {
    type Error = StreamingError;

    fn try_from(raw: RawImage) -> Result<Self> {
        Self::new(raw.width, raw.height, raw.mode, raw.pixels)
    }
}

/// A dense row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor, checking that `data` fills `shape` exactly.
    ///
    /// # Errors
    ///
    /// Returns a decode error on a length mismatch.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |total, &dim| total.checked_mul(dim));
        if expected != Some(data.len()) {
            let expected = shape.iter().map(|&d| d as u128).product::<u128>();
            return Err(StreamingError::decode(format!(
                "tensor of shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Unchecked wire form of [`Tensor`].
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = StreamingError;

    fn try_from(raw: RawTensor) -> Result<Self> {
        Self::new(raw.shape, raw.data)
    }
}

/// A dynamically typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Image(Image),
    Tensor(Tensor),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Short type name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Tensor(_) => "tensor",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Image> for Value {
    fn from(image: Image) -> Self {
        Self::Image(image)
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Self::Tensor(tensor)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Converts an image into a `[C, H, W]` tensor scaled to `0.0..=1.0`.
pub fn image_to_tensor(image: &Image) -> Tensor {
    let channels = image.mode.channels();
    let plane = image.width as usize * image.height as usize;
    let mut data = vec![0.0f32; plane * channels];

    for (i, px) in image.pixels.chunks_exact(channels).enumerate() {
        for (c, &v) in px.iter().enumerate() {
            data[c * plane + i] = f32::from(v) / 255.0;
        }
    }

    Tensor {
        shape: vec![channels, image.height as usize, image.width as usize],
        data,
    }
}

/// The standard input normalization applied when no transforms are given.
///
/// Images become channel-first float tensors; tensors are already in
/// canonical form and pass through.
///
/// # Errors
///
/// Returns a transform error for any other value.
pub fn to_tensor(value: Value) -> Result<Value> {
    match value {
        Value::Image(image) => Ok(Value::Tensor(image_to_tensor(&image))),
        Value::Tensor(tensor) => Ok(Value::Tensor(tensor)),
        other => Err(StreamingError::transform(format!(
            "to_tensor expected an image or tensor, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_rejects_bad_buffer() {
        assert!(Image::new(2, 2, ColorMode::Rgb, vec![0; 11]).is_err());
        assert!(Image::new(2, 2, ColorMode::Rgb, vec![0; 12]).is_ok());
    }

    #[test]
    fn test_pixel_lookup() {
        let image = Image::new(2, 1, ColorMode::Rgb, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(image.pixel(1, 0), Some(&[4u8, 5, 6][..]));
        assert_eq!(image.pixel(2, 0), None);
    }

    #[test]
    fn test_image_to_tensor_is_channel_first() {
        // 2x1 RGB: pixel0 = (255, 0, 51), pixel1 = (0, 255, 102)
        let image = Image::new(2, 1, ColorMode::Rgb, vec![255, 0, 51, 0, 255, 102]).unwrap();
        let tensor = image_to_tensor(&image);

        assert_eq!(tensor.shape(), &[3, 1, 2]);
        assert_eq!(tensor.data(), &[1.0, 0.0, 0.0, 1.0, 0.2, 0.4]);
    }

    #[test]
    fn test_grayscale_to_tensor() {
        let image = Image::new(1, 2, ColorMode::L, vec![0, 255]).unwrap();
        let tensor = image_to_tensor(&image);
        assert_eq!(tensor.shape(), &[1, 2, 1]);
        assert_eq!(tensor.data(), &[0.0, 1.0]);
    }

    #[test]
    fn test_to_tensor_passes_tensor_through() {
        let tensor = Tensor::new(vec![2], vec![0.5, 0.25]).unwrap();
        let out = to_tensor(Value::Tensor(tensor.clone())).unwrap();
        assert_eq!(out, Value::Tensor(tensor));
    }

    #[test]
    fn test_to_tensor_rejects_non_image() {
        let err = to_tensor(Value::Int(3)).unwrap_err();
        assert!(matches!(err, StreamingError::Transform { .. }));
        assert!(err.to_string().contains("got int"));
    }

    #[test]
    fn test_tensor_shape_check() {
        assert!(Tensor::new(vec![2, 3], vec![0.0; 5]).is_err());
        assert!(Tensor::new(vec![], vec![1.0]).is_ok());
    }

    #[test]
    fn test_decoding_checks_image_dimensions() {
        let image = Image::new(10, 10, ColorMode::L, vec![7; 100]).unwrap();
        let mut bytes = bincode::serialize(&image).unwrap();
        assert_eq!(bincode::deserialize::<Image>(&bytes).unwrap(), image);

        // Width is the leading little-endian u32
        bytes[..4].copy_from_slice(&4u32.to_le_bytes());
        assert!(bincode::deserialize::<Image>(&bytes).is_err());

        let value = bincode::serialize(&Value::Image(image)).unwrap();
        let mut patched = value.clone();
        // Skip the 4-byte variant tag
        patched[4..8].copy_from_slice(&4u32.to_le_bytes());
        assert!(bincode::deserialize::<Value>(&patched).is_err());
    }

    #[test]
    fn test_decoding_checks_tensor_shape() {
        let tensor = Tensor::new(vec![2, 2], vec![0.0; 4]).unwrap();
        let mut bytes = bincode::serialize(&tensor).unwrap();
        // shape: u64 length, then the first dimension
        bytes[8..16].copy_from_slice(&3u64.to_le_bytes());
        assert!(bincode::deserialize::<Tensor>(&bytes).is_err());
    }

    #[test]
    fn test_huge_dimensions_do_not_overflow() {
        assert!(Image::new(u32::MAX, u32::MAX, ColorMode::Rgba, vec![]).is_err());
        assert!(Tensor::new(vec![usize::MAX, 2], vec![]).is_err());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from(7i64).as_int(), Some(7));
        assert!(Value::from("cat").as_image().is_none());
        assert_eq!(Value::from(vec![1u8, 2]).kind(), "bytes");
    }
}
