use serde::{Deserialize, Serialize};

use crate::color::luma;
use crate::error::CoreError;

/// Buffer de pixels RGBA8, row-major, 4 bytes par pixel.
///
/// L'invariant `data.len() == width * height * 4` est garanti par les
/// constructeurs, y compris à la désérialisation.
///
/// # Example
/// ```
/// use gw_core::frame::PixelBuffer;
/// let buf = PixelBuffer::new(10, 10);
/// assert_eq!(buf.data().len(), 400);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPixelBuffer")]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

#[derive(Deserialize)]
struct RawPixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl TryFrom<RawPixelBuffer> for PixelBuffer {
    type Error = CoreError;

    fn try_from(raw: RawPixelBuffer) -> Result<Self, Self::Error> {
        Self::from_raw(raw.width, raw.height, raw.data)
    }
}

/// Byte length of an RGBA buffer of the given size.
#[inline]
#[must_use]
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

impl PixelBuffer {
    /// Crée un buffer transparent (tout à zéro).
    ///
    /// # Example
    /// ```
    /// use gw_core::frame::PixelBuffer;
    /// let buf = PixelBuffer::new(100, 50);
    /// assert_eq!(buf.width(), 100);
    /// assert_eq!(buf.height(), 50);
    /// assert_eq!(buf.pixel(0, 0), (0, 0, 0, 0));
    /// ```
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; rgba_len(width, height)],
        }
    }

    /// Crée un buffer rempli d'une couleur RGBA unie.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(rgba_len(width, height));
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wraps existing RGBA bytes.
    ///
    /// # Errors
    /// Retourne [`CoreError::BufferSize`] si la longueur ne vaut pas
    /// `width * height * 4`.
    ///
    /// # Example
    /// ```
    /// use gw_core::frame::PixelBuffer;
    /// assert!(PixelBuffer::from_raw(2, 2, vec![0; 16]).is_ok());
    /// assert!(PixelBuffer::from_raw(2, 2, vec![0; 15]).is_err());
    /// ```
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CoreError> {
        let expected = rgba_len(width, height);
        if data.len() != expected {
            return Err(CoreError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable RGBA bytes. The slice length is fixed, so the invariant holds.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the buffer and returns its bytes.
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Accès au pixel (x, y) → (r, g, b, a). Hors limites → transparent.
    #[inline(always)]
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> (u8, u8, u8, u8) {
        if x >= self.width || y >= self.height {
            return (0, 0, 0, 0);
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        (
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        )
    }

    /// Écrit le pixel (x, y). Ignoré hors limites.
    #[inline(always)]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.data[idx..idx + 4].copy_from_slice(&rgba);
    }

    /// Luma Rec.601 (`0.299R + 0.587G + 0.114B`) du pixel, non arrondie.
    ///
    /// # Example
    /// ```
    /// use gw_core::frame::PixelBuffer;
    /// let buf = PixelBuffer::filled(1, 1, [255, 255, 255, 255]);
    /// assert!((buf.luma(0, 0) - 255.0).abs() < 1e-3);
    /// ```
    #[inline(always)]
    #[must_use]
    pub fn luma(&self, x: u32, y: u32) -> f64 {
        let (r, g, b, _) = self.pixel(x, y);
        luma(r, g, b)
    }

    /// True si au moins un pixel n'est pas totalement opaque.
    #[must_use]
    pub fn has_transparency(&self) -> bool {
        self.data.chunks_exact(4).any(|px| px[3] < 255)
    }
}

/// Une frame décodée et son délai d'affichage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Pixels de la frame.
    pub buffer: PixelBuffer,
    /// Délai avant la frame suivante, en millisecondes.
    pub delay_ms: u32,
}

impl Frame {
    #[must_use]
    pub fn new(buffer: PixelBuffer, delay_ms: u32) -> Self {
        Self { buffer, delay_ms }
    }
}

/// Séquence ordonnée de frames partageant les mêmes dimensions.
///
/// # Example
/// ```
/// use gw_core::frame::{AnimationSequence, Frame, PixelBuffer};
/// let mut seq = AnimationSequence::new(4, 4);
/// seq.push(Frame::new(PixelBuffer::new(4, 4), 100)).unwrap();
/// assert!(!seq.is_animated());
/// assert!(seq.push(Frame::new(PixelBuffer::new(2, 2), 100)).is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationSequence {
    frames: Vec<Frame>,
    width: u32,
    height: u32,
}

impl AnimationSequence {
    /// Empty sequence with fixed dimensions.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frames: Vec::new(),
            width,
            height,
        }
    }

    /// Sequence made of one still frame.
    #[must_use]
    pub fn single(buffer: PixelBuffer, delay_ms: u32) -> Self {
        let (width, height) = (buffer.width(), buffer.height());
        Self {
            frames: vec![Frame::new(buffer, delay_ms)],
            width,
            height,
        }
    }

    /// Appends a frame.
    ///
    /// # Errors
    /// Retourne [`CoreError::FrameMismatch`] si la frame n'a pas les
    /// dimensions de la séquence.
    pub fn push(&mut self, frame: Frame) -> Result<(), CoreError> {
        if frame.buffer.width() != self.width || frame.buffer.height() != self.height {
            return Err(CoreError::FrameMismatch {
                width: self.width,
                height: self.height,
                actual_width: frame.buffer.width(),
                actual_height: frame.buffer.height(),
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Animated means more than one frame.
    #[must_use]
    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }
}

/// Texte ASCII colorisé d'une frame et son délai.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsciiFrame {
    /// Markup glyphe + couleur, une ligne par rangée.
    pub text: String,
    /// Délai en millisecondes.
    pub delay_ms: u32,
}

impl AsciiFrame {
    #[must_use]
    pub fn new(text: String, delay_ms: u32) -> Self {
        Self { text, delay_ms }
    }
}
