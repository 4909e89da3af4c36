//! 命令行工具依赖的通用组件.

use lung_berry::CtWindow;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 向 `w` 写入一条分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 适合观察肺实质的窗口: 窗位 -600, 窗宽 1500.
#[inline]
pub fn lung_window() -> CtWindow {
    CtWindow::from_lung_visual()
}

/// 适合观察纵隔软组织的窗口: 窗位 40, 窗宽 400.
#[inline]
pub fn mediastinal_window() -> CtWindow {
    CtWindow::from_mediastinal_visual()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sep_and_windows() {
        let mut buf = vec![];
        sep_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SEP.len() + 1);
        assert!(cpus() >= 1);
        assert_eq!(lung_window().level(), -600.0);
        assert_eq!(mediastinal_window().width(), 400.0);
    }
}
