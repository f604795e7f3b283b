use crate::jvm::class_file::{StackMapFrame, StackMapTable};
use crate::jvm::Error;
use std::collections::BTreeMap;

/// Frames from a stack map table, keyed by the absolute offset they describe
///
/// In the class file, the first frame's `offset_delta` is its offset, and every subsequent frame
/// is at `offset_delta + 1` past the previous one. Working with absolute offsets makes it possible
/// to move or add frames without worrying about the deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbsoluteFrames(BTreeMap<usize, StackMapFrame>);

impl AbsoluteFrames {
    pub fn new() -> AbsoluteFrames {
        AbsoluteFrames(BTreeMap::new())
    }

    /// Resolve the deltas of a table into absolute offsets
    pub fn from_table(table: &StackMapTable) -> Result<AbsoluteFrames, Error> {
        let mut frames = BTreeMap::new();
        let mut previous: Option<usize> = None;
        for frame in &table.0 {
            let delta = frame.offset_delta() as usize;
            let offset = match previous {
                None => delta,
                Some(previous) => previous + delta + 1,
            };
            if frames.insert(offset, frame.clone()).is_some() {
                return Err(Error::ConflictingFrames(offset));
            }
            previous = Some(offset);
        }
        Ok(AbsoluteFrames(frames))
    }

    /// Add a frame, failing if there is already one at the offset
    pub fn insert(&mut self, offset: usize, frame: StackMapFrame) -> Result<(), Error> {
        if self.0.contains_key(&offset) {
            return Err(Error::ConflictingFrames(offset));
        }
        self.0.insert(offset, frame);
        Ok(())
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.0.contains_key(&offset)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }

    /// Move every frame (and the `new` offsets its uninitialized types point at)
    ///
    /// Frames that end up at the same offset are an error.
    pub fn relocate(
        self,
        map_offset: impl Fn(usize) -> Result<usize, Error>,
    ) -> Result<AbsoluteFrames, Error> {
        let mut relocated = AbsoluteFrames::new();
        for (offset, mut frame) in self.0 {
            frame.map_uninitialized(|new_offset| {
                let moved = map_offset(new_offset as usize)?;
                u16::try_from(moved).map_err(|_| Error::MethodCodeOverflow(moved))
            })?;
            relocated.insert(map_offset(offset)?, frame)?;
        }
        Ok(relocated)
    }

    /// Check that every one of these offsets has a frame
    pub fn ensure_frames_at(&self, offsets: impl IntoIterator<Item = usize>) -> Result<(), Error> {
        for offset in offsets {
            if !self.contains(offset) {
                return Err(Error::MissingFrame(offset));
            }
        }
        Ok(())
    }

    /// Turn the frames back into a table with offset deltas
    pub fn into_table(self) -> Result<StackMapTable, Error> {
        let mut previous: Option<usize> = None;
        let mut table = Vec::with_capacity(self.0.len());
        for (offset, mut frame) in self.0 {
            let delta = match previous {
                None => offset,
                Some(previous) => offset - previous - 1,
            };
            let delta = u16::try_from(delta).map_err(|_| Error::MethodCodeOverflow(offset))?;
            frame.set_offset_delta(delta);
            table.push(frame);
            previous = Some(offset);
        }
        Ok(StackMapTable(table))
    }
}
