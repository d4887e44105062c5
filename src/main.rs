use tableau_dax::convert;

fn main() {
    let default_table = "Sales";
    let tests = [
        "IF SUM([Sales]) > 0 THEN [Profit] ELSE 0 END",
        "IF [Sales] > 100 THEN 'High' ELSEIF [Sales] > 50 THEN 'Mid' ELSE 'Low' END",
        "IF [a] THEN IF [b] THEN 1 END ELSE 2 END",
        "CASE [Region] WHEN 'East' THEN 1 WHEN 'West' THEN 2 ELSE 0 END",
        "CASE WHEN [Profit] > 0 THEN 'gain' ELSE 'loss' END",
        "{FIXED [Region]: SUM(IF [Year] = 2024 THEN [Sales] END)}",
        "{FIXED [Region], [Category]: COUNTD([Order ID])}",
        "{INCLUDE [Customer]: COUNTD([Order ID])}",
        "{INCLUDE [Region], [Category]: SUM([Sales])}",
        "{EXCLUDE [Region]: AVG([Sales])}",
        "IFNULL([Discount], 0) * ZN([Sales])",
        "ISNULL([Ship Date]) OR [Sales] > 0",
        "WINDOW_SUM(SUM([Sales]), -11, 0)",
        // Failure cases
        "IF [Sales] > 0 THEN 1",
        "CASE [x] THEN 1 END",
        "{FIXED [Region]: [Sales] * 2}",
    ];

    for test in tests.iter() {
        match convert(test, default_table) {
            Ok(dax) => println!("{test}\n=>\n{dax}\n"),
            Err(e) => println!("{test}\n=> Error: {e}\n"),
        }
    }
}
