// ==========================================
// 进口散货分配系统 - 导入层
// ==========================================
// 职责: 外部 CRUD 层交付的原始能力登记 / 库存事件文件导入
// 支持: CSV
// ==========================================

pub mod csv_importer;
pub mod error;

pub use csv_importer::{
    CapacityCsvImporter, ImportReport, RowError, StockEventCsvImporter, CAPACITY_COLUMNS,
    STOCK_EVENT_COLUMNS,
};
pub use error::{ImportError, ImportResult};
