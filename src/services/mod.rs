pub mod webdav;
