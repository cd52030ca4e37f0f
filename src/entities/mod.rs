pub mod app_user;
pub mod catalog_book;
pub mod link_suggestion;
pub mod order_subitem;
pub mod student_enrollment;
pub mod textbook_order;
