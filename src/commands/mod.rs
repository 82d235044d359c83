pub mod ocr_words;
pub mod page_images;
pub mod process;
pub mod subsample;
