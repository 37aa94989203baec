pub mod podusage;
