//! CSV 轨迹文件解析
//!
//! 每行 13 列：`p1..p6, v1..v6, t`，`t` 为距上一点的时间（秒）。
//! 空行和以 `#` 开头的行被忽略；第一行若不是数字则视为表头。

use anyhow::{Context, Result, bail};
use fs100_driver::{NUMBER_OF_JOINTS, TrajectoryPoint};
use std::path::Path;

const COLUMNS: usize = 2 * NUMBER_OF_JOINTS + 1;

/// 从文件加载轨迹
pub fn load(path: impl AsRef<Path>) -> Result<Vec<TrajectoryPoint>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read trajectory {}", path.display()))?;
    parse(&content).with_context(|| format!("invalid trajectory {}", path.display()))
}

/// 解析 CSV 文本
pub fn parse(content: &str) -> Result<Vec<TrajectoryPoint>> {
    let mut points = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if points.is_empty() && index == first_data_line(content) && is_header(&fields) {
            continue;
        }
        if fields.len() != COLUMNS {
            bail!(
                "line {}: expected {} columns, got {}",
                index + 1,
                COLUMNS,
                fields.len()
            );
        }

        let values = fields
            .iter()
            .map(|f| f.parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()
            .with_context(|| format!("line {}: invalid number", index + 1))?;

        let time = values[COLUMNS - 1];
        if !time.is_finite() || time < 0.0 {
            bail!("line {}: invalid time delta {}", index + 1, time);
        }

        let point = TrajectoryPoint::from_slices(
            &values[..NUMBER_OF_JOINTS],
            &values[NUMBER_OF_JOINTS..2 * NUMBER_OF_JOINTS],
            time,
        )
        .with_context(|| format!("line {}: wrong joint count", index + 1))?;
        points.push(point);
    }

    if points.is_empty() {
        bail!("trajectory contains no points");
    }
    Ok(points)
}

fn first_data_line(content: &str) -> usize {
    content
        .lines()
        .position(|l| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        })
        .unwrap_or(0)
}

fn is_header(fields: &[&str]) -> bool {
    fields.iter().any(|f| f.parse::<f32>().is_err())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header_and_comments() {
        let csv = "\
# demo trajectory
p1,p2,p3,p4,p5,p6,v1,v2,v3,v4,v5,v6,t
0,0,0,0,0,0,0,0,0,0,0,0,0

0.1,0,0,0,0,0,0.1,0,0,0,0,0,1.0
";
        let points = parse(csv).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].positions[0], 0.1);
        assert_eq!(points[1].velocities[0], 0.1);
        assert_eq!(points[1].time, 1.0);
    }

    #[test]
    fn test_wrong_column_count() {
        let err = parse("0,0,0,0,0,0,0,0,0,0,0,0\n").unwrap_err();
        assert!(err.to_string().contains("expected 13 columns"));
    }

    #[test]
    fn test_rejects_negative_time_and_garbage() {
        assert!(parse("0,0,0,0,0,0,0,0,0,0,0,0,-1\n").is_err());
        assert!(parse("0,0,0,0,0,0,0,0,0,0,0,0,0\n0,x,0,0,0,0,0,0,0,0,0,0,0\n").is_err());
        assert!(parse("# only comments\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.csv");
        std::fs::write(&path, "0,0,0,0,0,0,0,0,0,0,0,0,0.5\n").unwrap();
        assert_eq!(load(&path).unwrap().len(), 1);
        assert!(load(dir.path().join("missing.csv")).is_err());
    }
}
