//! Décodage précis des GIF animés : patches composités sur un canevas
//! persistant, en respectant la méthode de disposal de chaque frame.

use std::io::Cursor;

use ::gif::{ColorOutput, DecodeOptions, DisposalMethod};
use gw_core::frame::{AnimationSequence, Frame, PixelBuffer};

use crate::error::SourceError;

/// Délai minimal d'une frame GIF, en centisecondes.
const MIN_DELAY_CS: u16 = 2;

/// Délai en millisecondes d'une frame GIF (`max(cs, 2) * 10`).
///
/// # Example
/// ```
/// use gw_source::gif::delay_ms;
/// assert_eq!(delay_ms(0), 20);
/// assert_eq!(delay_ms(7), 70);
/// ```
#[must_use]
pub fn delay_ms(centiseconds: u16) -> u32 {
    u32::from(centiseconds.max(MIN_DELAY_CS)) * 10
}

/// Décode toutes les frames d'un GIF en images pleine taille.
///
/// Les pixels transparents d'un patch ne recouvrent pas le canevas. Après
/// capture, la zone du patch est effacée (`Background`) ou restaurée
/// (`Previous`) ; `Keep` et `Any` laissent le canevas tel quel.
///
/// Un flux tronqué après au moins une frame garde les frames déjà lues.
///
/// # Errors
/// Returns [`SourceError::Empty`] for a zero-sized logical screen, and
/// [`SourceError::Decode`] when the header or the first frame is unreadable.
pub fn decode_gif(bytes: &[u8]) -> Result<AnimationSequence, SourceError> {
    let mut opts = DecodeOptions::new();
    opts.set_color_output(ColorOutput::RGBA);
    let mut decoder = opts.read_info(Cursor::new(bytes))?;

    let (width, height) = (u32::from(decoder.width()), u32::from(decoder.height()));
    if width == 0 || height == 0 {
        return Err(SourceError::Empty { format: "GIF" });
    }

    let mut canvas = PixelBuffer::new(width, height);
    let mut sequence = AnimationSequence::new(width, height);

    loop {
        let frame = match decoder.read_next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if sequence.is_empty() => return Err(e.into()),
            Err(e) => {
                log::warn!("GIF tronqué après {} frames : {e}", sequence.len());
                break;
            }
        };

        let patch = Patch {
            left: u32::from(frame.left),
            top: u32::from(frame.top),
            width: u32::from(frame.width),
            height: u32::from(frame.height),
        };
        let saved = (frame.dispose == DisposalMethod::Previous).then(|| canvas.clone());

        patch.composite(&mut canvas, &frame.buffer);
        sequence.push(Frame::new(canvas.clone(), delay_ms(frame.delay)))?;

        match frame.dispose {
            DisposalMethod::Background => patch.clear(&mut canvas),
            DisposalMethod::Previous => {
                if let Some(prev) = saved {
                    canvas = prev;
                }
            }
            DisposalMethod::Keep | DisposalMethod::Any => {}
        }
    }

    log::debug!("GIF {width}x{height} : {} frames décodées", sequence.len());
    Ok(sequence)
}

/// Rectangle d'un patch sur le canevas.
#[derive(Clone, Copy, Debug)]
struct Patch {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl Patch {
    fn composite(self, canvas: &mut PixelBuffer, rgba: &[u8]) {
        for (i, px) in rgba.chunks_exact(4).enumerate() {
            if px[3] == 0 {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            let i = i as u32;
            let (x, y) = (self.left + i % self.width, self.top + i / self.width);
            if x < canvas.width() && y < canvas.height() {
                canvas.set_pixel(x, y, [px[0], px[1], px[2], px[3]]);
            }
        }
    }

    fn clear(self, canvas: &mut PixelBuffer) {
        let x_end = (self.left + self.width).min(canvas.width());
        let y_end = (self.top + self.height).min(canvas.height());
        for y in self.top..y_end {
            for x in self.left..x_end {
                canvas.set_pixel(x, y, [0, 0, 0, 0]);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::borrow::Cow;

    use super::*;

    const PALETTE: [u8; 9] = [255, 0, 0, 0, 0, 255, 0, 0, 0];

    /// Deux frames 2×2 : fond rouge, puis un pixel bleu en (1, 1).
    pub(crate) fn two_frame_gif(first_dispose: DisposalMethod, first_delay: u16) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut enc = ::gif::Encoder::new(&mut out, 2, 2, &[]).unwrap();
            enc.write_frame(&::gif::Frame {
                width: 2,
                height: 2,
                delay: first_delay,
                dispose: first_dispose,
                palette: Some(PALETTE.to_vec()),
                buffer: Cow::Owned(vec![0, 0, 0, 0]),
                ..::gif::Frame::default()
            })
            .unwrap();
            enc.write_frame(&::gif::Frame {
                left: 1,
                top: 1,
                width: 1,
                height: 1,
                delay: 5,
                palette: Some(PALETTE.to_vec()),
                buffer: Cow::Owned(vec![1]),
                ..::gif::Frame::default()
            })
            .unwrap();
        }
        out
    }

    #[test]
    fn keep_disposal_accumulates_patches() {
        let seq = decode_gif(&two_frame_gif(DisposalMethod::Keep, 0)).unwrap();
        assert_eq!(seq.len(), 2);
        let second = &seq.frames()[1].buffer;
        assert_eq!(second.pixel(0, 0), (255, 0, 0, 255));
        assert_eq!(second.pixel(1, 1), (0, 0, 255, 255));
    }

    #[test]
    fn background_disposal_clears_previous_patch() {
        let seq = decode_gif(&two_frame_gif(DisposalMethod::Background, 10)).unwrap();
        let second = &seq.frames()[1].buffer;
        assert_eq!(second.pixel(0, 0), (0, 0, 0, 0));
        assert_eq!(second.pixel(1, 1), (0, 0, 255, 255));
    }

    fn patch(left: u16, top: u16, index: u8, dispose: DisposalMethod) -> ::gif::Frame<'static> {
        ::gif::Frame {
            left,
            top,
            width: 1,
            height: 1,
            delay: 5,
            dispose,
            palette: Some(PALETTE.to_vec()),
            buffer: Cow::Owned(vec![index]),
            ..::gif::Frame::default()
        }
    }

    #[test]
    fn previous_disposal_restores_canvas() {
        let mut out = Vec::new();
        {
            let mut enc = ::gif::Encoder::new(&mut out, 2, 2, &[]).unwrap();
            enc.write_frame(&::gif::Frame {
                width: 2,
                height: 2,
                delay: 5,
                dispose: DisposalMethod::Keep,
                palette: Some(PALETTE.to_vec()),
                buffer: Cow::Owned(vec![0, 0, 0, 0]),
                ..::gif::Frame::default()
            })
            .unwrap();
            enc.write_frame(&patch(0, 0, 1, DisposalMethod::Previous)).unwrap();
            enc.write_frame(&patch(1, 1, 2, DisposalMethod::Keep)).unwrap();
        }

        let seq = decode_gif(&out).unwrap();
        assert_eq!(seq.len(), 3);
        let frames = seq.frames();
        assert_eq!(frames[1].buffer.pixel(0, 0), (0, 0, 255, 255));

        // Le patch bleu a disparu : (0, 0) retrouve le rouge de la frame 0.
        let third = &frames[2].buffer;
        assert_eq!(third.pixel(0, 0), (255, 0, 0, 255));
        assert_eq!(third.pixel(1, 0), (255, 0, 0, 255));
        assert_eq!(third.pixel(0, 1), (255, 0, 0, 255));
        assert_eq!(third.pixel(1, 1), (0, 0, 0, 255));
    }

    #[test]
    fn delays_are_clamped_to_twenty_ms() {
        let seq = decode_gif(&two_frame_gif(DisposalMethod::Keep, 0)).unwrap();
        let delays: Vec<u32> = seq.frames().iter().map(|f| f.delay_ms).collect();
        assert_eq!(delays, vec![20, 50]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode_gif(b"GIF89a\x00"),
            Err(SourceError::Decode(_))
        ));
    }
}
