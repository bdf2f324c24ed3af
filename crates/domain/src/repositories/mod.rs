//! 仓储接口定义
//!
//! 所有跨连接共享的可变状态都存放在后端存储中，并且只能通过
//! 这里定义的窄接口进行变更。

pub mod online_message_repository;
pub mod online_user_repository;
pub mod user_directory;

pub use online_message_repository::{MessageQuery, OnlineMessageRepository};
pub use online_user_repository::OnlineUserRepository;
pub use user_directory::{UserDirectory, UserRef};

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, 200),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

/// 分页结果
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_normalizes_inputs() {
        let p = Pagination::new(0, 0);
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 1);
        assert_eq!(p.offset(), 0);

        let p = Pagination::new(3, 1000);
        assert_eq!(p.page_size, 200);
        assert_eq!(p.offset(), 400);
    }

    #[test]
    fn paginated_result_counts_pages() {
        let result = PaginatedResult::<u8>::new(vec![], 41, Pagination::new(1, 20));
        assert_eq!(result.total_pages(), 3);
    }
}
