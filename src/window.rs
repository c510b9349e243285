use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::axis::{
    Axis, AxisRange, AxisState, RebinOption, crop_parameters, maximum_value, minimum_value,
    rebin_parameters, size_value,
};
use crate::error::{Result, WindowError};
use crate::punch::{PunchParams, PunchReport, punch};
use crate::rebin::rebin;
use crate::volume::{Quantity, Volume, mask_array, plane_shape};

/// 载入时捕获的原始数据，之后不再修改
/// 所有 reset 都从这里重新计算
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    pub volume: Volume,
    pub axes: AxisState,
}

/// 表格里可编辑的列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditField {
    Bins,
    Min,
    Max,
}

/// 编辑被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditRejection {
    NotANumber,
    /// 只允许减少 bin 数
    BinCountNotShrinking,
    BinCountTooSmall,
    MinimumOutOfRange,
    MaximumOutOfRange,
    OperationFailed,
}

/// 一次表格编辑的结果，两种情况都带上需要重新显示的轴状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EditOutcome {
    Applied { axes: AxisState },
    Rejected { reason: EditRejection, axes: AxisState },
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }

    pub fn axes(&self) -> &AxisState {
        match self {
            EditOutcome::Applied { axes } | EditOutcome::Rejected { axes, .. } => axes,
        }
    }
}

/// 用于显示的二维切面
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub axis: Axis,
    pub index: usize,
    /// 吸附到 bin 中心后的坐标
    pub value: f64,
    pub shape: [usize; 2],
    pub data: Vec<f64>,
}

/// 倒易空间体数据的窗口化引擎
/// 持有不可变的原始快照、当前体数据和当前轴状态
/// 每个操作先在副本上计算，成功后整体替换，失败时状态不变
#[derive(Debug, Clone)]
pub struct VolumeWindow {
    raw: Arc<RawSnapshot>,
    current: Volume,
    axes: AxisState,
}

impl VolumeWindow {
    /// 载入新数据并捕获原始快照
    pub fn load(volume: Volume, axes: AxisState) -> Result<Self> {
        if axes.counts() != volume.shape() {
            return Err(WindowError::AxisShapeMismatch {
                axes: axes.counts(),
                shape: volume.shape(),
            });
        }
        let volume = mask_array(volume);
        let raw = Arc::new(RawSnapshot {
            volume: volume.clone(),
            axes,
        });
        Ok(Self {
            raw,
            current: volume,
            axes,
        })
    }

    pub fn raw(&self) -> &RawSnapshot {
        &self.raw
    }

    pub fn volume(&self) -> &Volume {
        &self.current
    }

    pub fn axes(&self) -> &AxisState {
        &self.axes
    }

    /// 重分箱到 counts，各轴物理范围不变
    /// 只能减少 bin 数；只有一个 bin 的轴才允许保持 count == 1
    pub fn rebin(&mut self, counts: [usize; 3]) -> Result<()> {
        let mut axes = self.axes;
        for axis in Axis::ALL {
            let range = self.axes.get(axis);
            let count = counts[axis.index()];
            if count == 0 || count > range.count || (count == 1 && range.count > 1) {
                return Err(WindowError::InvalidBinCount { axis, count });
            }
            axes.set(axis, AxisRange::new(range.min, range.max, count)?);
        }

        let volume = mask_array(rebin(&self.current, counts)?);
        self.replace(volume, axes);
        Ok(())
    }

    /// 按半开索引区间裁剪，新的范围由边界 bin 的中心给出
    pub fn crop_indices(&mut self, slices: [Range<usize>; 3]) -> Result<()> {
        let volume = mask_array(self.current.crop(&slices)?);
        let mut axes = self.axes;
        for axis in Axis::ALL {
            let slice = &slices[axis.index()];
            let range = self.axes.get(axis);
            axes.set(
                axis,
                AxisRange::new(range.value(slice.start), range.value(slice.end - 1), slice.len())?,
            );
        }
        self.replace(volume, axes);
        Ok(())
    }

    /// 按物理范围裁剪，None 表示该轴不变
    pub fn crop_range(&mut self, ranges: [Option<(f64, f64)>; 3]) -> Result<()> {
        let slices = self.slices_for(&ranges)?;
        self.crop_indices(slices)
    }

    /// 在当前数据上挖除布拉格峰
    pub fn punch(&mut self, params: &PunchParams) -> Result<PunchReport> {
        let mut volume = self.current.clone();
        let report = punch(&mut volume, &self.axes, params)?;
        self.current = mask_array(volume);
        debug!(
            lattice_points = report.lattice_points,
            punched = report.punched,
            outliers = report.outliers,
            "punch 完成"
        );
        Ok(report)
    }

    /// 完全恢复到原始快照
    pub fn reset_data(&mut self) {
        self.current = self.raw.volume.clone();
        self.axes = self.raw.axes;
    }

    /// 只把一个轴恢复为原始范围和分箱，其余两个轴保持当前状态，
    /// 然后从原始数据重新裁剪并重分箱
    pub fn reset_axis(&mut self, axis: Axis) -> Result<()> {
        let mut target = self.axes;
        target.set(axis, *self.raw.axes.get(axis));
        let (volume, axes) = self.cropbin(&target)?;
        self.replace(volume, axes);
        Ok(())
    }

    /// 撤销 punch，但保留当前的裁剪与分箱
    pub fn reset_punch(&mut self) -> Result<()> {
        let (volume, axes) = self.cropbin(&self.axes)?;
        self.replace(volume, axes);
        Ok(())
    }

    /// 从原始数据裁剪到 target 的范围，再重分箱到 target 的 bin 数
    /// 返回的轴范围是原始网格上实际选中的范围
    fn cropbin(&self, target: &AxisState) -> Result<(Volume, AxisState)> {
        let raw_axes = &self.raw.axes;
        let mut slices = [0..0, 0..0, 0..0];
        let mut realized = [raw_axes.h, raw_axes.k, raw_axes.l];
        for axis in Axis::ALL {
            let wanted = target.get(axis);
            let raw = raw_axes.get(axis);
            let (start, end) = crop_parameters(wanted.min, wanted.max, raw.min, raw.max, raw.count)
                .ok_or(WindowError::EmptySelection {
                    axis,
                    lo: wanted.min,
                    hi: wanted.max,
                })?;
            slices[axis.index()] = start..end;
            let count = if end - start == 1 {
                1
            } else {
                wanted.count.max(2)
            };
            realized[axis.index()] = AxisRange::new(raw.value(start), raw.value(end - 1), count)?;
        }

        let cropped = self.raw.volume.crop(&slices)?;
        let counts = realized.map(|range| range.count);
        let volume = mask_array(rebin(&cropped, counts)?);
        let [h, k, l] = realized;
        Ok((volume, AxisState::new(h, k, l)))
    }

    /// 表格编辑：文本先解析再按规则校验，通过后执行重分箱或裁剪
    /// 被拒绝时状态不变，返回的轴状态用于恢复显示
    pub fn apply_edit(&mut self, axis: Axis, field: EditField, text: &str) -> EditOutcome {
        let range = *self.axes.get(axis);
        let verdict = match field {
            EditField::Bins => self.edit_bins(axis, &range, text),
            EditField::Min => self.edit_min(axis, &range, text),
            EditField::Max => self.edit_max(axis, &range, text),
        };

        match verdict {
            Ok(()) => EditOutcome::Applied { axes: self.axes },
            Err(reason) => {
                debug!(%axis, ?field, text, ?reason, "表格编辑被拒绝");
                EditOutcome::Rejected {
                    reason,
                    axes: self.axes,
                }
            }
        }
    }

    fn edit_bins(
        &mut self,
        axis: Axis,
        range: &AxisRange,
        text: &str,
    ) -> std::result::Result<(), EditRejection> {
        let size: usize = text
            .trim()
            .parse()
            .map_err(|_| EditRejection::NotANumber)?;
        let implied = size_value(range.min, range.max, range.step);
        if size <= 1 {
            return Err(EditRejection::BinCountTooSmall);
        }
        if size >= implied {
            return Err(EditRejection::BinCountNotShrinking);
        }

        let mut counts = self.axes.counts();
        counts[axis.index()] = size;
        self.rebin(counts).map_err(|err| {
            warn!(%axis, %err, "重分箱失败");
            EditRejection::OperationFailed
        })
    }

    fn edit_min(
        &mut self,
        axis: Axis,
        range: &AxisRange,
        text: &str,
    ) -> std::result::Result<(), EditRejection> {
        let minimum = parse_coordinate(text)?;
        let low = minimum_value(range.count, range.step, range.max);
        if !(minimum > low && minimum < range.max) {
            return Err(EditRejection::MinimumOutOfRange);
        }
        self.crop_axis(axis, minimum, range.max, EditRejection::MinimumOutOfRange)
    }

    fn edit_max(
        &mut self,
        axis: Axis,
        range: &AxisRange,
        text: &str,
    ) -> std::result::Result<(), EditRejection> {
        let maximum = parse_coordinate(text)?;
        let high = maximum_value(range.count, range.step, range.min);
        if !(maximum < high && maximum > range.min) {
            return Err(EditRejection::MaximumOutOfRange);
        }
        self.crop_axis(axis, range.min, maximum, EditRejection::MaximumOutOfRange)
    }

    /// 编辑后的范围至少要保留两个 bin，否则按越界拒绝
    fn crop_axis(
        &mut self,
        axis: Axis,
        lo: f64,
        hi: f64,
        too_narrow: EditRejection,
    ) -> std::result::Result<(), EditRejection> {
        let range = self.axes.get(axis);
        match crop_parameters(lo, hi, range.min, range.max, range.count) {
            Some((start, end)) if end - start >= 2 => {}
            _ => return Err(too_narrow),
        }

        let mut ranges = [None; 3];
        ranges[axis.index()] = Some((lo, hi));
        self.crop_range(ranges).map_err(|err| {
            warn!(%axis, %err, "裁剪失败");
            EditRejection::OperationFailed
        })
    }

    /// 取垂直于 axis 的切面
    /// value 缺失或超出当前范围时回退到中间的 bin
    pub fn slice_plane(&self, axis: Axis, value: Option<f64>, quantity: Quantity) -> Plane {
        let range = self.axes.get(axis);
        let index = match value {
            Some(v) if v.is_finite() && range.contains(v) => range.index_of(v),
            _ => (range.count - 1) / 2,
        };
        Plane {
            axis,
            index,
            value: range.value(index),
            shape: plane_shape(self.current.shape(), axis),
            data: self.current.plane(axis, index, quantity),
        }
    }

    /// 当前数据的显示范围，全部屏蔽时为 None
    pub fn value_range(&self, quantity: Quantity) -> Option<(f64, f64)> {
        self.current.value_range(quantity)
    }

    pub fn rebin_options(&self, axis: Axis, centered: bool) -> Vec<RebinOption> {
        rebin_parameters(self.axes.get(axis), centered)
    }

    fn slices_for(&self, ranges: &[Option<(f64, f64)>; 3]) -> Result<[Range<usize>; 3]> {
        let mut slices = [0..0, 0..0, 0..0];
        for axis in Axis::ALL {
            let range = self.axes.get(axis);
            slices[axis.index()] = match ranges[axis.index()] {
                None => 0..range.count,
                Some((lo, hi)) => {
                    let (start, end) = crop_parameters(lo, hi, range.min, range.max, range.count)
                        .ok_or(WindowError::EmptySelection { axis, lo, hi })?;
                    start..end
                }
            };
        }
        Ok(slices)
    }

    fn replace(&mut self, volume: Volume, axes: AxisState) {
        debug_assert_eq!(volume.shape(), axes.counts());
        self.current = volume;
        self.axes = axes;
    }
}

fn parse_coordinate(text: &str) -> std::result::Result<f64, EditRejection> {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(EditRejection::NotANumber),
    }
}
