use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WindowError};

/// 以 bin 为单位的边界容差，吸收浮点误差
const EDGE_TOLERANCE: f64 = 1e-6;

/// 倒易空间的三个轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    H,
    K,
    L,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::H, Axis::K, Axis::L];

    /// 在 shape / 轴状态数组中的位置
    pub fn index(self) -> usize {
        match self {
            Axis::H => 0,
            Axis::K => 1,
            Axis::L => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::H => "h",
            Axis::K => "k",
            Axis::L => "l",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 单个轴的范围与分箱
/// min / max 是首尾 bin 中心的物理坐标，count 个 bin 等间距分布
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub count: usize,
}

impl AxisRange {
    /// 由 (min, max, count) 构造，step 由前三者推出
    /// 只有一个 bin 时 min == max，step 记为 0
    pub fn new(min: f64, max: f64, count: usize) -> Result<Self> {
        let invalid = WindowError::InvalidRange { min, max, count };
        if count == 0 || !min.is_finite() || !max.is_finite() {
            return Err(invalid);
        }

        if count == 1 {
            let tolerance = EDGE_TOLERANCE * min.abs().max(1.0);
            if (max - min).abs() > tolerance {
                return Err(invalid);
            }
            return Ok(Self {
                min,
                max: min,
                step: 0.0,
                count,
            });
        }

        if min >= max {
            return Err(invalid);
        }

        Ok(Self {
            min,
            max,
            step: (max - min) / (count - 1) as f64,
            count,
        })
    }

    /// 第 index 个 bin 中心的坐标
    pub fn value(&self, index: usize) -> f64 {
        slice_value(self.min, self.max, self.count, index)
    }

    /// 离 value 最近的 bin
    pub fn index_of(&self, value: f64) -> usize {
        slice_index(self.min, self.max, self.count, value)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// 三个轴当前的范围与分箱
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisState {
    pub h: AxisRange,
    pub k: AxisRange,
    pub l: AxisRange,
}

impl AxisState {
    pub fn new(h: AxisRange, k: AxisRange, l: AxisRange) -> Self {
        Self { h, k, l }
    }

    pub fn get(&self, axis: Axis) -> &AxisRange {
        match axis {
            Axis::H => &self.h,
            Axis::K => &self.k,
            Axis::L => &self.l,
        }
    }

    pub fn set(&mut self, axis: Axis, range: AxisRange) {
        match axis {
            Axis::H => self.h = range,
            Axis::K => self.k = range,
            Axis::L => self.l = range,
        }
    }

    /// 对应体数据的 shape
    pub fn counts(&self) -> [usize; 3] {
        [self.h.count, self.k.count, self.l.count]
    }
}

/// 物理坐标 -> 最近的 bin 索引，结果截断到 [0, n)
pub fn slice_index(min: f64, max: f64, n: usize, value: f64) -> usize {
    if n <= 1 || max <= min || !value.is_finite() {
        return 0;
    }
    let step = (max - min) / (n - 1) as f64;
    let index = ((value - min) / step).round();
    if index <= 0.0 {
        0
    } else {
        (index as usize).min(n - 1)
    }
}

/// bin 索引 -> bin 中心的物理坐标
pub fn slice_value(min: f64, max: f64, n: usize, index: usize) -> f64 {
    if n <= 1 {
        return min;
    }
    let step = (max - min) / (n - 1) as f64;
    min + index as f64 * step
}

/// 固定范围下，由步长反推 bin 数
pub fn size_value(min: f64, max: f64, step: f64) -> usize {
    if !(step > 0.0) || !step.is_finite() || max <= min {
        return 1;
    }
    ((max - min) / step).round() as usize + 1
}

/// 固定 bin 数与步长，由上界反推下界
pub fn minimum_value(size: usize, step: f64, max: f64) -> f64 {
    max - step * size.saturating_sub(1) as f64
}

/// 固定 bin 数与步长，由下界反推上界
pub fn maximum_value(size: usize, step: f64, min: f64) -> f64 {
    min + step * size.saturating_sub(1) as f64
}

/// 物理范围 [lo, hi] -> 半开索引区间 [start, end)
/// 只选中心落在范围内的 bin，因此裁剪后的范围一定包含在请求范围之内
/// 范围内没有任何 bin 时返回 None
pub fn crop_parameters(lo: f64, hi: f64, min: f64, max: f64, n: usize) -> Option<(usize, usize)> {
    if n == 0 || !lo.is_finite() || !hi.is_finite() || lo > hi {
        return None;
    }

    if n == 1 || max <= min {
        let tolerance = EDGE_TOLERANCE * min.abs().max(1.0);
        return (lo - tolerance <= min && min <= hi + tolerance).then_some((0, 1));
    }

    let step = (max - min) / (n - 1) as f64;
    let start = ((lo - min) / step - EDGE_TOLERANCE).ceil().max(0.0);
    let last = ((hi - min) / step + EDGE_TOLERANCE)
        .floor()
        .min((n - 1) as f64);
    if last < 0.0 || start > last {
        return None;
    }
    Some((start as usize, last as usize + 1))
}

/// 重分箱下拉框里的一个候选项
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RebinOption {
    pub step: f64,
    pub count: usize,
}

/// 列出某个轴所有能整除当前间隔数的粗化方案
/// centered 为 true 时，只保留整数格点仍然落在 bin 中心的方案
pub fn rebin_parameters(range: &AxisRange, centered: bool) -> Vec<RebinOption> {
    if range.count < 3 {
        return Vec::new();
    }
    let intervals = range.count - 1;

    // 第一个整数格点相对 min 的 bin 偏移
    let first_integer = (range.min - EDGE_TOLERANCE * range.step).ceil();
    let offset = (first_integer - range.min) / range.step;
    let offset_bins = offset.round();
    let offset_aligned = (offset - offset_bins).abs() < EDGE_TOLERANCE * 1e3;

    (2..=intervals)
        .filter(|factor| intervals % factor == 0)
        .filter(|&factor| {
            if !centered {
                return true;
            }
            let step = range.step * factor as f64;
            let per_unit = 1.0 / step;
            let integral = per_unit >= 1.0 - 1e-9 && (per_unit - per_unit.round()).abs() < 1e-6;
            integral && offset_aligned && (offset_bins as usize) % factor == 0
        })
        .map(|factor| RebinOption {
            step: range.step * factor as f64,
            count: intervals / factor + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn slice_index_inverts_slice_value() {
        for &(min, max, n) in &[(0.0, 9.0, 10), (-2.0, 2.0, 41), (-5.25, 3.5, 36), (0.1, 0.2, 2)] {
            for index in 0..n {
                let value = slice_value(min, max, n, index);
                assert_eq!(slice_index(min, max, n, value), index);
            }
        }
    }

    #[test]
    fn slice_index_clamps_outside_values() {
        assert_eq!(slice_index(0.0, 9.0, 10, -3.0), 0);
        assert_eq!(slice_index(0.0, 9.0, 10, 42.0), 9);
        assert_eq!(slice_index(0.0, 9.0, 10, f64::NAN), 0);
        assert_eq!(slice_index(1.0, 1.0, 1, 5.0), 0);
    }

    #[test]
    fn size_and_bounds_round_trip() {
        let (min, max, step) = (-2.0, 2.0, 0.1);
        let n = size_value(min, max, step);
        assert_eq!(n, 41);
        assert_relative_eq!(minimum_value(n, step, max), min, epsilon = 1e-9);
        assert_relative_eq!(maximum_value(n, step, min), max, epsilon = 1e-9);
    }

    #[test]
    fn crop_parameters_selects_contained_bins() {
        assert_eq!(crop_parameters(2.0, 7.0, 0.0, 9.0, 10), Some((2, 8)));
        // 范围落在两个 bin 之间时向内取整
        assert_eq!(crop_parameters(2.3, 6.7, 0.0, 9.0, 10), Some((3, 7)));
        assert_eq!(crop_parameters(-4.0, 20.0, 0.0, 9.0, 10), Some((0, 10)));
        assert_eq!(crop_parameters(2.3, 2.7, 0.0, 9.0, 10), None);
        assert_eq!(crop_parameters(10.0, 12.0, 0.0, 9.0, 10), None);
    }

    #[test]
    fn axis_range_rejects_degenerate_input() {
        assert!(AxisRange::new(1.0, 0.0, 5).is_err());
        assert!(AxisRange::new(0.0, 1.0, 0).is_err());
        assert!(AxisRange::new(0.0, 1.0, 1).is_err());
        assert!(AxisRange::new(f64::NAN, 1.0, 3).is_err());

        let single = AxisRange::new(0.5, 0.5, 1).unwrap();
        assert_eq!(single.step, 0.0);
        assert_eq!(single.value(0), 0.5);
    }

    #[test]
    fn rebin_parameters_lists_divisors() {
        let range = AxisRange::new(-2.0, 2.0, 41).unwrap();
        let counts: Vec<usize> = rebin_parameters(&range, false)
            .iter()
            .map(|option| option.count)
            .collect();
        assert_eq!(counts, vec![21, 11, 9, 6, 5, 3, 2]);

        let centered: Vec<usize> = rebin_parameters(&range, true)
            .iter()
            .map(|option| option.count)
            .collect();
        assert_eq!(centered, vec![21, 9, 5]);
    }

    #[test]
    fn centered_rebin_respects_lattice_offset() {
        // 整数格点从第 1 个 bin 开始，任何因子都会把它们错开
        let range = AxisRange::new(-1.25, 1.25, 11).unwrap();
        let centered: Vec<f64> = rebin_parameters(&range, true)
            .iter()
            .map(|option| option.step)
            .collect();
        assert!(centered.is_empty());

        let range = AxisRange::new(-1.0, 1.5, 11).unwrap();
        let centered: Vec<usize> = rebin_parameters(&range, true)
            .iter()
            .map(|option| option.count)
            .collect();
        assert_eq!(centered, vec![6]);
    }
}
