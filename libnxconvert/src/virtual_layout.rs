//! Shape planning for virtual and chunked datasets.
//!
//! Nothing in here touches a file; the writer looks up source shapes, asks for
//! a plan and then maps it onto HDF5 selections.
use super::constants::MAX_CHUNK_BYTES;
use super::error::WriterError;
use super::value::{LinkTarget, SliceSpec};

/// Part of one axis: `count` elements starting at `start`. Axes that are not
/// kept were selected by a single index and do not appear in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSelection {
    pub start: usize,
    pub count: usize,
    pub keep: bool,
}

impl AxisSelection {
    pub fn full(len: usize) -> Self {
        Self {
            start: 0,
            count: len,
            keep: true,
        }
    }
}

/// One source mapped into the virtual dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub target: LinkTarget,
    pub source_shape: Vec<usize>,
    /// Region read from the source, one entry per source axis
    pub source: Vec<AxisSelection>,
    /// Region written in the virtual dataset, one entry per virtual axis
    pub destination: Vec<AxisSelection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualPlan {
    pub shape: Vec<usize>,
    pub placements: Vec<Placement>,
}

fn mismatch(path: &str, message: String) -> WriterError {
    WriterError::VirtualShapeMismatch {
        path: path.to_string(),
        message,
    }
}

/// Stack sources along axis 0. All trailing dimensions must agree.
pub fn plan_concat(
    path: &str,
    sources: &[(LinkTarget, Vec<usize>)],
) -> Result<VirtualPlan, WriterError> {
    let Some((_, first_shape)) = sources.first() else {
        return Err(mismatch(path, String::from("no sources to concatenate")));
    };
    if first_shape.is_empty() {
        return Err(mismatch(path, String::from("scalar sources cannot be concatenated")));
    }
    let trailing = &first_shape[1..];
    let mut placements = Vec::with_capacity(sources.len());
    let mut offset = 0;
    for (target, shape) in sources {
        if shape.len() != first_shape.len() || &shape[1..] != trailing {
            return Err(mismatch(
                path,
                format!("{target} has shape {shape:?}, expected (_, {trailing:?})"),
            ));
        }
        let mut destination = vec![AxisSelection {
            start: offset,
            count: shape[0],
            keep: true,
        }];
        destination.extend(trailing.iter().map(|len| AxisSelection::full(*len)));
        placements.push(Placement {
            target: target.clone(),
            source_shape: shape.clone(),
            source: shape.iter().map(|len| AxisSelection::full(*len)).collect(),
            destination,
        });
        offset += shape[0];
    }
    let mut shape = vec![offset];
    shape.extend_from_slice(trailing);
    Ok(VirtualPlan { shape, placements })
}

/// Resolve a selection against a source shape. Missing trailing axes are
/// selected in full; an index drops its axis from the result.
pub fn resolve_selection(
    path: &str,
    source_shape: &[usize],
    selection: &[SliceSpec],
) -> Result<Vec<AxisSelection>, WriterError> {
    if selection.len() > source_shape.len() {
        return Err(mismatch(
            path,
            format!(
                "selection has {} axes but the source has shape {source_shape:?}",
                selection.len()
            ),
        ));
    }
    let mut resolved = Vec::with_capacity(source_shape.len());
    for (axis, len) in source_shape.iter().enumerate() {
        let spec = selection.get(axis).copied().unwrap_or(SliceSpec::FULL);
        let axis_selection = match spec {
            SliceSpec::Index(index) if index < *len => AxisSelection {
                start: index,
                count: 1,
                keep: false,
            },
            SliceSpec::Index(index) => {
                return Err(mismatch(
                    path,
                    format!("index {index} is out of bounds for axis {axis} of length {len}"),
                ))
            }
            SliceSpec::Range { start, stop } => {
                let start = start.unwrap_or(0);
                let stop = stop.map_or(*len, |s| s.min(*len));
                if start > stop {
                    return Err(mismatch(
                        path,
                        format!("empty range {start}:{stop} on axis {axis}"),
                    ));
                }
                AxisSelection {
                    start,
                    count: stop - start,
                    keep: true,
                }
            }
        };
        resolved.push(axis_selection);
    }
    Ok(resolved)
}

/// View part of one source
pub fn plan_slice(
    path: &str,
    target: &LinkTarget,
    source_shape: &[usize],
    selection: &[SliceSpec],
) -> Result<VirtualPlan, WriterError> {
    let source = resolve_selection(path, source_shape, selection)?;
    let shape: Vec<usize> = source.iter().filter(|a| a.keep).map(|a| a.count).collect();
    Ok(VirtualPlan {
        placements: vec![Placement {
            target: target.clone(),
            source_shape: source_shape.to_vec(),
            source,
            destination: shape.iter().map(|len| AxisSelection::full(*len)).collect(),
        }],
        shape,
    })
}

/// Chunk shape for a compressed dataset: the whole array, halved along its
/// longest axis until one chunk fits in [`MAX_CHUNK_BYTES`]
pub fn chunk_shape(shape: &[usize], element_size: usize) -> Vec<usize> {
    let mut chunk: Vec<usize> = shape.iter().map(|len| (*len).max(1)).collect();
    let element_size = element_size.max(1);
    while chunk.iter().product::<usize>() * element_size > MAX_CHUNK_BYTES {
        let Some((axis, longest)) = chunk
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|(_, len)| *len)
        else {
            break;
        };
        if longest == 1 {
            break;
        }
        chunk[axis] = longest.div_ceil(2);
    }
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external(file: &str) -> LinkTarget {
        LinkTarget::External {
            file: file.into(),
            path: String::from("/data"),
        }
    }

    #[test]
    fn test_concat_stacks_along_first_axis() {
        let sources: Vec<(LinkTarget, Vec<usize>)> = ["a.h5", "b.h5", "c.h5"]
            .iter()
            .map(|f| (external(f), vec![10]))
            .collect();
        let plan = plan_concat("/entry/data/stack", &sources).unwrap();
        assert_eq!(plan.shape, vec![30]);
        let starts: Vec<usize> = plan.placements.iter().map(|p| p.destination[0].start).collect();
        assert_eq!(starts, vec![0, 10, 20]);

        let mismatched = vec![(external("a.h5"), vec![4, 3]), (external("b.h5"), vec![4, 2])];
        assert!(matches!(
            plan_concat("/entry/data/stack", &mismatched),
            Err(WriterError::VirtualShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_slice_drops_indexed_axes() {
        let selection = SliceSpec::parse_selection("[:,1,:,:]").unwrap();
        let target = LinkTarget::Internal(String::from("/entry/raw"));
        let plan = plan_slice("/entry/data/view", &target, &[5, 3, 4, 2], &selection).unwrap();
        assert_eq!(plan.shape, vec![5, 4, 2]);
        assert_eq!(plan.placements[0].source[1].start, 1);

        let partial = SliceSpec::parse_selection("2:4").unwrap();
        let plan = plan_slice("/entry/data/view", &target, &[6, 3], &partial).unwrap();
        assert_eq!(plan.shape, vec![2, 3]);

        let out_of_bounds = SliceSpec::parse_selection("[:,7]").unwrap();
        assert!(plan_slice("/entry/data/view", &target, &[6, 3], &out_of_bounds).is_err());
    }

    #[test]
    fn test_chunks_fit_the_byte_budget() {
        let chunk = chunk_shape(&[4096, 4096], 8);
        assert!(chunk.iter().product::<usize>() * 8 <= MAX_CHUNK_BYTES);
        assert_eq!(chunk_shape(&[100], 8), vec![100]);
        assert_eq!(chunk_shape(&[0, 3], 4), vec![1, 3]);
    }
}
