use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::error::{Result, WindowError};

/// 要读取的数据量：信号或误差平方（方差）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    #[default]
    Signal,
    ErrorSq,
}

impl Quantity {
    pub fn as_str(self) -> &'static str {
        match self {
            Quantity::Signal => "signal",
            Quantity::ErrorSq => "error_sq",
        }
    }
}

/// 倒易空间体数据
/// 信号与误差平方共用同一个 shape 和同一份有效位图
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    /// 网格维度 [nh, nk, nl]
    shape: [usize; 3],
    /// 数据数组，h 变化最快，k 其次，l 最慢
    /// 索引计算: index = il * nh * nk + ik * nh + ih
    signal: Vec<f64>,
    error_sq: Vec<f64>,
    /// false 表示该 cell 被屏蔽，不参与任何聚合与统计
    valid: Vec<bool>,
}

impl Volume {
    /// 创建新的体数据，非有限值自动屏蔽
    pub fn new(shape: [usize; 3], signal: Vec<f64>, error_sq: Vec<f64>) -> Result<Self> {
        let total_elements = cell_count(shape)?;

        if signal.len() != error_sq.len() {
            return Err(WindowError::ArrayMismatch {
                signal: signal.len(),
                error_sq: error_sq.len(),
            });
        }
        if signal.len() != total_elements {
            return Err(WindowError::ShapeMismatch {
                shape,
                expected: total_elements,
                actual: signal.len(),
            });
        }

        let valid = vec![true; total_elements];
        Ok(mask_array(Self {
            shape,
            signal,
            error_sq,
            valid,
        }))
    }

    /// 由已经对齐的数组直接组装，内部使用
    pub(crate) fn from_parts(
        shape: [usize; 3],
        signal: Vec<f64>,
        error_sq: Vec<f64>,
        valid: Vec<bool>,
    ) -> Self {
        debug_assert_eq!(signal.len(), shape[0] * shape[1] * shape[2]);
        debug_assert_eq!(signal.len(), error_sq.len());
        debug_assert_eq!(signal.len(), valid.len());
        mask_array(Self {
            shape,
            signal,
            error_sq,
            valid,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    pub fn error_sq(&self) -> &[f64] {
        &self.error_sq
    }

    pub fn valid(&self) -> &[bool] {
        &self.valid
    }

    pub fn values(&self, quantity: Quantity) -> &[f64] {
        match quantity {
            Quantity::Signal => &self.signal,
            Quantity::ErrorSq => &self.error_sq,
        }
    }

    /// [ih, ik, il] -> 扁平索引
    pub fn index(&self, ih: usize, ik: usize, il: usize) -> usize {
        flat_index(self.shape, [ih, ik, il])
    }

    pub fn is_valid(&self, ih: usize, ik: usize, il: usize) -> bool {
        self.valid[self.index(ih, ik, il)]
    }

    pub fn masked_count(&self) -> usize {
        self.valid.iter().filter(|valid| !**valid).count()
    }

    /// 屏蔽一个 cell，返回它之前是否有效
    pub(crate) fn mask_cell(&mut self, index: usize) -> bool {
        let was_valid = self.valid[index];
        self.valid[index] = false;
        self.signal[index] = f64::NAN;
        self.error_sq[index] = f64::NAN;
        was_valid
    }

    /// 有效 cell 上的 (min, max)
    /// 全部被屏蔽时返回 None
    pub fn value_range(&self, quantity: Quantity) -> Option<(f64, f64)> {
        self.values(quantity)
            .iter()
            .zip(&self.valid)
            .filter(|(_, valid)| **valid)
            .fold(None, |acc, (&value, _)| match acc {
                None => Some((value, value)),
                Some((lo, hi)) => Some((lo.min(value), hi.max(value))),
            })
    }

    /// 按半开索引区间截取子体积，不做任何重采样
    pub fn crop(&self, slices: &[Range<usize>; 3]) -> Result<Volume> {
        for axis in Axis::ALL {
            let slice = &slices[axis.index()];
            let len = self.shape[axis.index()];
            if slice.start >= slice.end || slice.end > len {
                return Err(WindowError::SliceOutOfBounds {
                    axis,
                    start: slice.start,
                    end: slice.end,
                    len,
                });
            }
        }

        let shape = [slices[0].len(), slices[1].len(), slices[2].len()];
        let total_elements = shape[0] * shape[1] * shape[2];
        let mut signal = Vec::with_capacity(total_elements);
        let mut error_sq = Vec::with_capacity(total_elements);
        let mut valid = Vec::with_capacity(total_elements);

        for il in slices[2].clone() {
            for ik in slices[1].clone() {
                let row = self.index(slices[0].start, ik, il);
                let end = row + shape[0];
                signal.extend_from_slice(&self.signal[row..end]);
                error_sq.extend_from_slice(&self.error_sq[row..end]);
                valid.extend_from_slice(&self.valid[row..end]);
            }
        }

        Ok(Volume::from_parts(shape, signal, error_sq, valid))
    }

    /// 取出垂直于 axis、位于 index 处的二维切面
    /// 屏蔽的 cell 以 NaN 输出
    pub fn plane(&self, axis: Axis, index: usize, quantity: Quantity) -> Vec<f64> {
        let values = self.values(quantity);
        let [nh, nk, nl] = self.shape;
        let mut out = Vec::new();
        match axis {
            Axis::H => {
                out.reserve(nk * nl);
                for il in 0..nl {
                    for ik in 0..nk {
                        out.push(values[self.index(index, ik, il)]);
                    }
                }
            }
            Axis::K => {
                out.reserve(nh * nl);
                for il in 0..nl {
                    for ih in 0..nh {
                        out.push(values[self.index(ih, index, il)]);
                    }
                }
            }
            Axis::L => {
                let start = self.index(0, 0, index);
                out.extend_from_slice(&values[start..start + nh * nk]);
            }
        }
        out
    }
}

/// 切面在另外两个轴上的 shape，第一个维度变化最快
pub fn plane_shape(shape: [usize; 3], axis: Axis) -> [usize; 2] {
    match axis {
        Axis::H => [shape[1], shape[2]],
        Axis::K => [shape[0], shape[2]],
        Axis::L => [shape[0], shape[1]],
    }
}

/// nh * nk * nl，溢出时报错
pub fn cell_count(shape: [usize; 3]) -> Result<usize> {
    shape[0]
        .checked_mul(shape[1])
        .and_then(|n| n.checked_mul(shape[2]))
        .ok_or(WindowError::ShapeTooLarge { shape })
}

pub(crate) fn flat_index(shape: [usize; 3], at: [usize; 3]) -> usize {
    at[2] * shape[0] * shape[1] + at[1] * shape[0] + at[0]
}

/// 扫描非有限值与哨兵值并标记为屏蔽
/// 信号或误差平方不是有限值、或误差平方为负的 cell 都视为缺失覆盖
/// 屏蔽后两份数组在该位置统一写入 NaN
pub fn mask_array(mut volume: Volume) -> Volume {
    for index in 0..volume.signal.len() {
        let signal = volume.signal[index];
        let error_sq = volume.error_sq[index];
        let sentinel = !signal.is_finite() || !error_sq.is_finite() || error_sq < 0.0;
        if sentinel || !volume.valid[index] {
            volume.mask_cell(index);
        }
    }
    volume
}
