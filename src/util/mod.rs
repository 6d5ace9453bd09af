pub mod buf_ext;
