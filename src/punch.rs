use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::axis::{Axis, AxisRange, AxisState};
use crate::error::{Result, WindowError};
use crate::volume::Volume;

/// 离群检测至少需要的有效样本数
const MIN_OUTLIER_SAMPLES: usize = 4;

/// 2 与 3 的最小公倍数
const RESIDUE_PERIOD: usize = 6;

/// 超过 2^53 的浮点坐标已经不能精确表示整数
const MAX_LATTICE_COORD: f64 = 9.0e15;

/// 晶格心化类型，决定哪些整数格点 (h, k, l) 是允许的反射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Centering {
    #[default]
    P,
    I,
    F,
    A,
    B,
    C,
    R,
}

impl Centering {
    /// 反射条件
    pub fn allows(self, h: i64, k: i64, l: i64) -> bool {
        match self {
            Centering::P => true,
            Centering::I => (h + k + l).rem_euclid(2) == 0,
            Centering::F => {
                let parity = h.rem_euclid(2);
                k.rem_euclid(2) == parity && l.rem_euclid(2) == parity
            }
            Centering::A => (k + l).rem_euclid(2) == 0,
            Centering::B => (h + l).rem_euclid(2) == 0,
            Centering::C => (h + k).rem_euclid(2) == 0,
            Centering::R => (-h + k + l).rem_euclid(3) == 0,
        }
    }
}

/// 每个格点周围的挖除形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunchShape {
    #[default]
    Ellipsoid,
    Box,
}

/// Remove 屏蔽格点邻域；Isolate 只保留格点邻域，屏蔽其余所有 cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunchMode {
    #[default]
    Remove,
    Isolate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunchParams {
    /// 各轴半径，单位为 bin
    pub radii: [f64; 3],
    #[serde(default)]
    pub centering: Centering,
    /// 四分位距倍数，None 表示不做离群检测
    #[serde(default)]
    pub outlier: Option<f64>,
    #[serde(default)]
    pub shape: PunchShape,
    #[serde(default)]
    pub mode: PunchMode,
}

impl PunchParams {
    pub fn validate(&self) -> Result<()> {
        for axis in Axis::ALL {
            let radius = self.radii[axis.index()];
            if !radius.is_finite() || radius < 0.0 {
                return Err(WindowError::InvalidRadius { axis, radius });
            }
        }
        if let Some(outlier) = self.outlier {
            if !outlier.is_finite() || outlier < 0.0 {
                return Err(WindowError::InvalidOutlier(outlier));
            }
        }
        Ok(())
    }

    fn half_widths(&self) -> [usize; 3] {
        self.radii.map(|radius| radius.round() as usize)
    }

    /// 偏移 d（单位 bin）是否落在挖除形状内
    fn covers(&self, offset: [isize; 3]) -> bool {
        match self.shape {
            PunchShape::Box => true,
            PunchShape::Ellipsoid => {
                let mut sum = 0.0;
                for a in 0..3 {
                    let d = offset[a] as f64;
                    let r = self.radii[a];
                    if r == 0.0 {
                        if offset[a] != 0 {
                            return false;
                        }
                    } else {
                        sum += (d / r) * (d / r);
                    }
                }
                sum <= 1.0 + 1e-9
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PunchReport {
    /// 参与挖除的格点数
    pub lattice_points: usize,
    /// 因形状被新屏蔽的 cell 数
    pub punched: usize,
    /// 因离群被新屏蔽的 cell 数
    pub outliers: usize,
    /// 离群检测扫描的轮数
    pub sweeps: usize,
}

/// 在有效范围内的每个允许格点周围挖除布拉格峰
///
/// 屏蔽同时作用于信号和误差平方；离群检测只看信号
/// 离群检测反复扫描所有格点邻域直到一整轮没有新的屏蔽，
/// 因此对同样参数重复调用不会再改变屏蔽集合
pub fn punch(volume: &mut Volume, axes: &AxisState, params: &PunchParams) -> Result<PunchReport> {
    params.validate()?;
    let shape = volume.shape();
    if axes.counts() != shape {
        return Err(WindowError::AxisShapeMismatch {
            axes: axes.counts(),
            shape,
        });
    }

    let centers = lattice_centers(axes, params.centering);
    let half = params.half_widths();
    let mut report = PunchReport {
        lattice_points: centers.len(),
        ..PunchReport::default()
    };

    // ==================== 步骤 1: 形状屏蔽 ====================
    let mut covered = vec![false; volume.len()];
    for center in &centers {
        for_each_in_box(shape, *center, half, |index, offset| {
            if params.covers(offset) {
                covered[index] = true;
            }
        });
    }

    for (index, &inside) in covered.iter().enumerate() {
        let target = match params.mode {
            PunchMode::Remove => inside,
            PunchMode::Isolate => !inside,
        };
        if target && volume.mask_cell(index) {
            report.punched += 1;
        }
    }

    // ==================== 步骤 2: 离群检测 ====================
    let Some(threshold) = params.outlier else {
        return Ok(report);
    };

    loop {
        let mut rejected = 0;
        for center in &centers {
            let mut samples = Vec::new();
            for_each_in_box(shape, *center, half, |index, _| {
                if volume.valid()[index] {
                    samples.push((index, volume.signal()[index]));
                }
            });
            if samples.len() < MIN_OUTLIER_SAMPLES {
                continue;
            }

            let mut sorted: Vec<f64> = samples.iter().map(|(_, value)| *value).collect();
            sorted.sort_by(f64::total_cmp);
            let q1 = percentile(&sorted, 0.25);
            let q3 = percentile(&sorted, 0.75);
            let spread = q3 - q1;
            let lower = q1 - threshold * spread;
            let upper = q3 + threshold * spread;

            for (index, value) in samples {
                if (value < lower || value > upper) && volume.mask_cell(index) {
                    rejected += 1;
                }
            }
        }
        report.sweeps += 1;
        report.outliers += rejected;
        if rejected == 0 {
            break;
        }
    }

    Ok(report)
}

/// 有效范围内满足反射条件的整数格点，换算成最近的 bin 索引
/// 落到同一个 bin 的格点只算一次
fn lattice_centers(axes: &AxisState, centering: Centering) -> Vec<[usize; 3]> {
    let [hs, ks, ls] = Axis::ALL.map(|axis| axis_candidates(axes.get(axis)));

    let mut centers = BTreeSet::new();
    for &(h, ih) in &hs {
        for &(k, ik) in &ks {
            for &(l, il) in &ls {
                if centering.allows(h, k, l) {
                    centers.insert([ih, ik, il]);
                }
            }
        }
    }
    centers.into_iter().collect()
}

/// 单个轴上的候选整数坐标及其所在 bin
///
/// 反射条件只取决于坐标模 2 与模 3 的余数，所以每个 bin 最多保留
/// RESIDUE_PERIOD 个连续整数即可代表落在其中的全部格点；
/// 候选数因此受 bin 数约束，与物理范围的宽度无关
fn axis_candidates(range: &AxisRange) -> Vec<(i64, usize)> {
    let tolerance = 1e-6 * range.step.max(1e-6);
    let lo = (range.min - tolerance).ceil().max(-MAX_LATTICE_COORD);
    let hi = (range.max + tolerance).floor().min(MAX_LATTICE_COORD);
    let half = range.step / 2.0;

    let mut candidates = Vec::new();
    for index in 0..range.count {
        let center = range.value(index);
        let mut value = (center - half - tolerance).ceil().max(lo);
        let last = (center + half + tolerance).floor().min(hi);
        let mut kept = 0;
        while value <= last && kept < RESIDUE_PERIOD {
            // bin 边界上的整数只归属 index_of 给出的那个 bin
            if range.index_of(value) == index {
                candidates.push((value as i64, index));
                kept += 1;
            }
            value += 1.0;
        }
    }
    candidates
}

/// 遍历以 center 为中心、半宽为 half 的盒子内所有 cell（截断到体数据边界）
fn for_each_in_box(
    shape: [usize; 3],
    center: [usize; 3],
    half: [usize; 3],
    mut visit: impl FnMut(usize, [isize; 3]),
) {
    let lo = [0, 1, 2].map(|a| center[a].saturating_sub(half[a]));
    let hi = [0, 1, 2].map(|a| (center[a] + half[a]).min(shape[a] - 1));
    for il in lo[2]..=hi[2] {
        for ik in lo[1]..=hi[1] {
            for ih in lo[0]..=hi[0] {
                let offset = [
                    ih as isize - center[0] as isize,
                    ik as isize - center[1] as isize,
                    il as isize - center[2] as isize,
                ];
                let index = il * shape[0] * shape[1] + ik * shape[0] + ih;
                visit(index, offset);
            }
        }
    }
}

/// 线性插值的分位数，sorted 必须非空且已排序
fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    let position = fraction * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
