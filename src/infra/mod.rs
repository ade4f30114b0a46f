pub mod here;
