// ==========================================
// 药品库位管理系统 - 报表导出模块
// ==========================================
// 职责: 批次分量台账导出为 CSV（解析药品名称与库位位置）
// ==========================================

pub mod batch_report;
pub mod error;

pub use batch_report::{BatchReportExporter, ReportRow, REPORT_HEADER};
pub use error::{ExportError, ExportResult};
