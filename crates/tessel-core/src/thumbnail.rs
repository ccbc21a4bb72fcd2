//! Thumbnail atlas.
//!
//! Previews are packed into square atlas textures split into a grid of
//! equal slots. A new atlas is allocated only when every existing one is
//! full; atlases live until [`ThumbnailAtlas::destroy`].

use crate::backend::{Rect, RenderBackend, TargetDesc, TextureHandle};
use crate::error::BackendError;

/// A slot in one atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbHandle {
    atlas: u32,
    slot: u32,
}

#[derive(Debug)]
struct Atlas {
    texture: TextureHandle,
    used: Vec<bool>,
}

impl Atlas {
    fn free_slot(&self) -> Option<usize> {
        self.used.iter().position(|u| !u)
    }
}

/// Growable set of thumbnail atlases.
#[derive(Debug)]
pub struct ThumbnailAtlas {
    atlas_size: u32,
    thumb_size: u32,
    atlases: Vec<Atlas>,
}

impl ThumbnailAtlas {
    /// Creates an empty atlas set. `thumb_size` is clamped to `atlas_size`.
    pub fn new(atlas_size: u32, thumb_size: u32) -> Self {
        let atlas_size = atlas_size.max(1);
        Self {
            atlas_size,
            thumb_size: thumb_size.clamp(1, atlas_size),
            atlases: Vec::new(),
        }
    }

    fn per_row(&self) -> u32 {
        self.atlas_size / self.thumb_size
    }

    /// Slots in one atlas.
    pub fn slots_per_atlas(&self) -> usize {
        let n = self.per_row() as usize;
        n * n
    }

    /// Reserves a slot, allocating a new atlas if all are full.
    pub fn add_thumb(
        &mut self,
        backend: &mut dyn RenderBackend,
    ) -> Result<ThumbHandle, BackendError> {
        if let Some((atlas, slot)) = self
            .atlases
            .iter()
            .enumerate()
            .find_map(|(i, a)| a.free_slot().map(|s| (i, s)))
        {
            self.atlases[atlas].used[slot] = true;
            return Ok(ThumbHandle {
                atlas: atlas as u32,
                slot: slot as u32,
            });
        }
        let texture = backend.create_target(&TargetDesc::new(self.atlas_size, self.atlas_size))?;
        let mut used = vec![false; self.slots_per_atlas()];
        used[0] = true;
        self.atlases.push(Atlas { texture, used });
        tracing::debug!(atlases = self.atlases.len(), "thumbnail atlas allocated");
        Ok(ThumbHandle {
            atlas: (self.atlases.len() - 1) as u32,
            slot: 0,
        })
    }

    /// Frees a slot. Returns `false` for unknown or already-free handles.
    pub fn del_thumb(&mut self, handle: ThumbHandle) -> bool {
        match self
            .atlases
            .get_mut(handle.atlas as usize)
            .and_then(|a| a.used.get_mut(handle.slot as usize))
        {
            Some(used) if *used => {
                *used = false;
                true
            }
            _ => false,
        }
    }

    /// Slot rectangle in texels.
    pub fn pixel_rect(&self, handle: ThumbHandle) -> Option<Rect> {
        let atlas = self.atlases.get(handle.atlas as usize)?;
        if !atlas.used.get(handle.slot as usize).copied().unwrap_or(false) {
            return None;
        }
        let per_row = self.per_row();
        Some(Rect {
            x: (handle.slot % per_row) * self.thumb_size,
            y: (handle.slot / per_row) * self.thumb_size,
            width: self.thumb_size,
            height: self.thumb_size,
        })
    }

    /// Slot rectangle as normalized `[u0, v0, u1, v1]`.
    pub fn uv_rect(&self, handle: ThumbHandle) -> Option<[f32; 4]> {
        let r = self.pixel_rect(handle)?;
        let s = self.atlas_size as f32;
        Some([
            r.x as f32 / s,
            r.y as f32 / s,
            (r.x + r.width) as f32 / s,
            (r.y + r.height) as f32 / s,
        ])
    }

    /// Atlas texture holding `handle`.
    pub fn texture(&self, handle: ThumbHandle) -> Option<TextureHandle> {
        self.atlases.get(handle.atlas as usize).map(|a| a.texture)
    }

    /// Renders a scaled preview of `source` into the slot.
    pub fn blit_into(
        &self,
        backend: &mut dyn RenderBackend,
        handle: ThumbHandle,
        source: TextureHandle,
    ) -> Result<(), BackendError> {
        let (Some(texture), Some(rect)) = (self.texture(handle), self.pixel_rect(handle)) else {
            return Ok(());
        };
        backend.blit(source, texture, rect)
    }

    /// Slots currently in use.
    pub fn len(&self) -> usize {
        self.atlases
            .iter()
            .map(|a| a.used.iter().filter(|u| **u).count())
            .sum()
    }

    /// Returns `true` if no slot is in use.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of atlas textures.
    pub fn atlas_count(&self) -> usize {
        self.atlases.len()
    }

    /// Destroys every atlas texture.
    pub fn destroy(&mut self, backend: &mut dyn RenderBackend) {
        for atlas in self.atlases.drain(..) {
            backend.destroy_target(atlas.texture);
        }
    }
}
